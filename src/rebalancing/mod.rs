//! Shard rebalancing through the cluster entry point.
//!
//! # Flow
//!
//! ```text
//!   plan()  ──▶ suggested moves
//!                    │
//!   execute() ◀──────┘        (202 Accepted, runs asynchronously)
//!       │
//!   status()  ──▶ pending / queued move jobs, polled until idle
//! ```
//!
//! [`migrate_member`](RebalanceCoordinator::migrate_member) drains one
//! storage server onto another in batches, using the same flow.
//!
//! # Example
//!
//! ```rust,ignore
//! use shardctl::rebalancing::{RebalanceCoordinator, RebalancePlanRequest};
//!
//! let coordinator = RebalanceCoordinator::new(cache.get_cluster().await?);
//! let plan = coordinator
//!     .plan(&RebalancePlanRequest::new().with_maximum_number_of_moves(100))
//!     .await?;
//! coordinator.execute_moves(plan.moves).await?;
//! coordinator.wait_for_completion(&scope, Duration::from_secs(600)).await?;
//! ```

mod coordinator;
mod moves;

pub use coordinator::{MigrationStep, RebalanceCoordinator};
pub use moves::{
    migration_moves, RebalanceMove, RebalancePlan, RebalancePlanRequest, RebalanceRequest,
    RebalanceStatus, DEFAULT_MIGRATION_BATCH, REBALANCE_REQUEST_VERSION,
};
