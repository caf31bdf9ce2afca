//! Client-side orchestration core for a sharded, replicated database cluster.
//!
//! This crate talks to the members of a running deployment over HTTP and
//! provides:
//! - **Client cache** resolving members to authenticated clients, rebuilt
//!   once when a probe comes back unauthorized
//! - **Agency access** reading the planned (Plan) and observed (Current)
//!   shard placement from the consensus store
//! - **Shard distribution statistics** comparing Plan against Current
//! - **Rebalancing** requesting, submitting and tracking shard moves
//! - **Maintenance mode** for single members and for the whole supervision
//! - **Retry engine** with exponential back-off, permanent errors and
//!   deadline-bounded scopes
//!
//! # Example
//!
//! ```rust,no_run
//! use shardctl::metrics::{DistributionCollector, MetricsRegistry};
//! use shardctl::{ClientCache, ClientConfig, ClusterMember, ServerRole, StaticRoster, StaticSecrets};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let roster = StaticRoster::new("prod", "prod-ea").with_members([
//!         ClusterMember::new("AGNT-1", ServerRole::Agent, "prod-agnt-1"),
//!         ClusterMember::new("PRMR-1", ServerRole::DbServer, "prod-prmr-1"),
//!     ]);
//!     let secrets = StaticSecrets::new().with_secret("prod-jwt", "secret");
//!     let cache = Arc::new(ClientCache::new(
//!         Arc::new(roster),
//!         Arc::new(secrets),
//!         ClientConfig::default(),
//!     )?);
//!
//!     // Authenticated, probed client for one member
//!     let client = cache.get(ServerRole::DbServer, "PRMR-1").await?;
//!     println!("{:?}", client.version().await?);
//!
//!     // Shard distribution statistics
//!     let registry = MetricsRegistry::new();
//!     DistributionCollector::new(cache.clone()).collect(&registry).await?;
//!     println!("{}", registry.to_prometheus());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ Distribution │ │  Rebalance   │ │ Maintenance  │ │    Admin     │
//! │  Collector   │ │ Coordinator  │ │  Controller  │ │    Client    │
//! └──────┬───────┘ └──────┬───────┘ └──────┬───────┘ └──────┬───────┘
//!        │                └────────────────┼────────────────┘
//!        ▼                                 ▼
//! ┌──────────────┐                 ┌──────────────┐
//! │ AgencyClient │◀─────────────── │ ClientCache  │ ◀── MemberRoster
//! └──────────────┘                 └──────────────┘ ◀── SecretSource
//!        │                                 │
//!        └──────────── retry ──────────────┘
//! ```

pub mod admin;
pub mod agency;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod metrics;
pub mod network;
pub mod rebalancing;
pub mod retry;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::ClientConfig;
pub use error::{Error, NetworkError, Result, ResultExt};
pub use types::{ClusterMember, MemberId, MemberRoster, ServerRole, StaticRoster};

pub use network::{Client, ClientCache, SecretSource, StaticSecrets};
pub use retry::Scope;

pub use admin::AdminClient;
pub use agency::{AgencyClient, AgencyState, CurrentState, PlanState};
pub use maintenance::MaintenanceController;
pub use metrics::{DistributionCollector, DistributionReport, MetricsRegistry, MetricsSink};
pub use rebalancing::{MigrationStep, RebalanceCoordinator, RebalanceMove};
