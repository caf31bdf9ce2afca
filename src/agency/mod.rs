//! Agency access: the multi-endpoint client and the Plan/Current trees.

mod client;
pub mod state;

pub use client::{agency_key, AgencyClient};
pub use state::{
    AgencyState, CurrentShard, CurrentState, PlanCollection, PlanState, ReplicationFactor,
    ShardDetails, ShardLocation, ANY_SERVER,
};

use crate::error::{Result, ResultExt};

/// Agency path of the planned collections.
pub const PLAN_COLLECTIONS: [&str; 3] = ["arango", "Plan", "Collections"];

/// Agency path of the current collections.
pub const CURRENT_COLLECTIONS: [&str; 3] = ["arango", "Current", "Collections"];

/// Read the planned placement.
pub async fn fetch_plan(agency: &AgencyClient) -> Result<PlanState> {
    agency
        .read_key::<PlanState>(&PLAN_COLLECTIONS)
        .await
        .map(Option::unwrap_or_default)
        .context("reading Plan")
}

/// Read the observed placement.
pub async fn fetch_current(agency: &AgencyClient) -> Result<CurrentState> {
    agency
        .read_key::<CurrentState>(&CURRENT_COLLECTIONS)
        .await
        .map(Option::unwrap_or_default)
        .context("reading Current")
}

/// Read Plan and Current in one agency transaction.
pub async fn fetch_state(agency: &AgencyClient) -> Result<AgencyState> {
    let plan_key = agency_key(&PLAN_COLLECTIONS);
    let current_key = agency_key(&CURRENT_COLLECTIONS);
    let root = agency
        .read_raw(&[plan_key.as_str(), current_key.as_str()])
        .await
        .context("reading agency state")?;

    let plan = client::decode_at::<PlanState>(root.clone(), &PLAN_COLLECTIONS)
        .context("decoding Plan")?
        .unwrap_or_default();
    let current = client::decode_at::<CurrentState>(root, &CURRENT_COLLECTIONS)
        .context("decoding Current")?
        .unwrap_or_default();
    Ok(AgencyState::new(plan, current))
}
