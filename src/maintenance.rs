//! Per-member and cluster-wide maintenance mode.
//!
//! A member in maintenance mode is left alone by the cluster supervision
//! until the mode is switched off or its timeout elapses, after which the
//! server reverts to normal on its own. Re-enabling only refreshes the
//! timeout window, so every call is sent as-is.

use crate::error::{Result, ResultExt};
use crate::network::Client;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

const MAINTENANCE_PATH: &str = "/_admin/cluster/maintenance";

/// Requested member mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceMode {
    Maintenance,
    Normal,
}

/// Body of a member maintenance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub mode: MaintenanceMode,
    /// Auto-revert timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Maintenance state reported for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberMaintenance {
    #[serde(rename = "Mode")]
    pub mode: String,
    /// When the mode reverts.
    #[serde(rename = "Until", default)]
    pub until: Option<DateTime<Utc>>,
}

/// Toggles maintenance mode through a cluster client.
#[derive(Debug, Clone)]
pub struct MaintenanceController {
    client: Client,
    default_timeout: Duration,
}

impl MaintenanceController {
    /// Create a controller using the configured default timeout.
    pub fn new(client: Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    /// Put a member into maintenance until `timeout` elapses.
    pub async fn enable(&self, member_id: &str, timeout: Duration) -> Result<()> {
        let request = MaintenanceRequest {
            mode: MaintenanceMode::Maintenance,
            timeout: Some(timeout_secs(timeout)),
        };
        self.put_member(member_id, &request).await?;
        info!(member_id, timeout_secs = timeout_secs(timeout), "member maintenance enabled");
        Ok(())
    }

    /// [`enable`](Self::enable) with the default timeout.
    pub async fn enable_with_default_timeout(&self, member_id: &str) -> Result<()> {
        self.enable(member_id, self.default_timeout).await
    }

    /// Return a member to normal mode.
    pub async fn disable(&self, member_id: &str) -> Result<()> {
        let request = MaintenanceRequest {
            mode: MaintenanceMode::Normal,
            timeout: None,
        };
        self.put_member(member_id, &request).await?;
        info!(member_id, "member maintenance disabled");
        Ok(())
    }

    /// Current maintenance state of a member; `None` when in normal mode.
    pub async fn status(&self, member_id: &str) -> Result<Option<MemberMaintenance>> {
        self.client
            .request::<()>(Method::GET, &member_path(member_id), None, &[StatusCode::OK])
            .await
            .with_context(|| format!("maintenance status of {}", member_id))?
            .result()
    }

    /// Switch cluster-wide supervision maintenance on or off.
    pub async fn set_supervision_maintenance(&self, enabled: bool) -> Result<()> {
        let body = if enabled { "on" } else { "off" };
        self.client
            .request(Method::PUT, MAINTENANCE_PATH, Some(body), &[StatusCode::OK])
            .await
            .context("supervision maintenance")?;
        info!(enabled, "supervision maintenance toggled");
        Ok(())
    }

    async fn put_member(&self, member_id: &str, request: &MaintenanceRequest) -> Result<()> {
        self.client
            .request(Method::PUT, &member_path(member_id), Some(request), &[StatusCode::OK])
            .await
            .with_context(|| format!("maintenance of {}", member_id))?;
        Ok(())
    }
}

/// Whole seconds, rounded up so a sub-second timeout is never sent as 0.
fn timeout_secs(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}

fn member_path(member_id: &str) -> String {
    format!("{}/{}", MAINTENANCE_PATH, member_id)
}
