//! Shard move requests and plans.

use crate::agency::PlanState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version the execute endpoint accepts.
pub const REBALANCE_REQUEST_VERSION: u32 = 1;

/// Default number of moves submitted per migration step.
pub const DEFAULT_MIGRATION_BATCH: usize = 64;

/// A declarative relocation of one shard replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceMove {
    pub database: String,
    pub collection: String,
    pub shard: String,
    #[serde(rename = "from")]
    pub from_server: String,
    #[serde(rename = "to")]
    pub to_server: String,
    pub is_leader: bool,
}

/// Moves to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceRequest {
    /// Overwritten with [`REBALANCE_REQUEST_VERSION`] on submission.
    pub version: u32,
    pub moves: Vec<RebalanceMove>,
}

impl RebalanceRequest {
    /// Build a request from moves, keeping their order.
    pub fn from_moves(moves: impl IntoIterator<Item = RebalanceMove>) -> Self {
        Self {
            version: REBALANCE_REQUEST_VERSION,
            moves: moves.into_iter().collect(),
        }
    }
}

/// Options for computing a rebalance plan. Unset fields use server defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancePlanRequest {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_number_of_moves: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_changes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_leaders: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_followers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_system_collections: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pi_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub databases_excluded: Vec<String>,
}

impl RebalancePlanRequest {
    pub fn new() -> Self {
        Self {
            version: REBALANCE_REQUEST_VERSION,
            ..Default::default()
        }
    }

    pub fn with_maximum_number_of_moves(mut self, n: u32) -> Self {
        self.maximum_number_of_moves = Some(n);
        self
    }

    pub fn with_leader_changes(mut self, enabled: bool) -> Self {
        self.leader_changes = Some(enabled);
        self
    }

    pub fn with_move_leaders(mut self, enabled: bool) -> Self {
        self.move_leaders = Some(enabled);
        self
    }

    pub fn with_move_followers(mut self, enabled: bool) -> Self {
        self.move_followers = Some(enabled);
        self
    }

    pub fn with_exclude_system_collections(mut self, enabled: bool) -> Self {
        self.exclude_system_collections = Some(enabled);
        self
    }

    pub fn with_pi_factor(mut self, factor: f64) -> Self {
        self.pi_factor = Some(factor);
        self
    }

    pub fn with_databases_excluded(mut self, databases: impl IntoIterator<Item = String>) -> Self {
        self.databases_excluded = databases.into_iter().collect();
        self
    }
}

/// Suggested relocation plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancePlan {
    /// Server-reported imbalance before the moves; kept as raw JSON.
    #[serde(default)]
    pub imbalance_before: Value,
    /// Predicted imbalance after the moves.
    #[serde(default)]
    pub imbalance_after: Value,
    #[serde(default)]
    pub moves: Vec<RebalanceMove>,
}

/// Progress of submitted moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceStatus {
    /// Move jobs currently running.
    #[serde(rename = "pendingMoveShards", default)]
    pub pending_moves: u64,
    /// Move jobs queued.
    #[serde(rename = "todoMoveShards", default)]
    pub todo_moves: u64,
}

impl RebalanceStatus {
    /// Whether no move is running or queued.
    pub fn is_idle(&self) -> bool {
        self.pending_moves == 0 && self.todo_moves == 0
    }
}

/// Moves that drain `from` onto `to`, at most `limit` of them.
///
/// Collections that follow another collection's sharding and satellite
/// collections are skipped, as are shards without servers, shards not on
/// `from` and shards already on `to`. A move is a leader move when `from`
/// is the shard's planned leader.
pub fn migration_moves(plan: &PlanState, from: &str, to: &str, limit: usize) -> Vec<RebalanceMove> {
    let mut moves = Vec::new();
    for (db, col_id, collection) in plan.collections() {
        if collection.distribute_shards_like.is_some() || collection.is_satellite() {
            continue;
        }
        for (shard, servers) in &collection.shards {
            if moves.len() >= limit {
                return moves;
            }
            let Some(leader) = servers.first() else {
                continue;
            };
            if !servers.iter().any(|s| s == from) || servers.iter().any(|s| s == to) {
                continue;
            }
            moves.push(RebalanceMove {
                database: db.to_string(),
                collection: col_id.to_string(),
                shard: shard.clone(),
                from_server: from.to_string(),
                to_server: to.to_string(),
                is_leader: leader == from,
            });
        }
    }
    moves
}
