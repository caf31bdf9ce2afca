//! Rebalance coordinator talking to the cluster entry point.

use crate::agency::PlanState;
use crate::error::{Error, Result, ResultExt};
use crate::network::Client;
use crate::rebalancing::moves::{
    migration_moves, RebalanceMove, RebalancePlan, RebalancePlanRequest, RebalanceRequest,
    RebalanceStatus, REBALANCE_REQUEST_VERSION,
};
use crate::retry::{self, Scope};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

const REBALANCE_PATH: &str = "/_admin/cluster/rebalance";
const EXECUTE_PATH: &str = "/_admin/cluster/rebalance/execute";

/// Outcome of one migration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// Nothing left to move off the source server.
    Complete,
    /// Earlier moves are still running; nothing was submitted.
    Busy(RebalanceStatus),
    /// This many moves were submitted.
    Submitted(usize),
}

/// Requests, submits and tracks shard moves.
///
/// Calls are not retried here; wrap them in the retry engine where a
/// transient failure should be retried. Execution is asynchronous on the
/// server side: a submission is acknowledged with 202 and progress is
/// observed with [`status`](Self::status).
#[derive(Debug, Clone)]
pub struct RebalanceCoordinator {
    client: Client,
}

impl RebalanceCoordinator {
    /// Create a coordinator over a cluster client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Ask the cluster for a suggested plan.
    pub async fn plan(&self, request: &RebalancePlanRequest) -> Result<RebalancePlan> {
        let request = RebalancePlanRequest {
            version: REBALANCE_REQUEST_VERSION,
            ..request.clone()
        };
        self.client
            .request(Method::POST, REBALANCE_PATH, Some(&request), &[StatusCode::OK])
            .await
            .context("rebalance plan")?
            .result()
    }

    /// Counts of running and queued move jobs.
    pub async fn status(&self) -> Result<RebalanceStatus> {
        self.client
            .request::<()>(Method::GET, REBALANCE_PATH, None, &[StatusCode::OK])
            .await
            .context("rebalance status")?
            .result()
    }

    /// Submit moves. The request version is always sent as 1.
    pub async fn execute(&self, mut request: RebalanceRequest) -> Result<()> {
        request.version = REBALANCE_REQUEST_VERSION;
        self.client
            .request(Method::POST, EXECUTE_PATH, Some(&request), &[StatusCode::ACCEPTED])
            .await
            .context("rebalance execute")?;
        info!(moves = request.moves.len(), "rebalance moves submitted");
        Ok(())
    }

    /// Submit moves in the given order.
    pub async fn execute_moves(&self, moves: impl IntoIterator<Item = RebalanceMove>) -> Result<()> {
        self.execute(RebalanceRequest::from_moves(moves)).await
    }

    /// Poll [`status`](Self::status) until no move is running or queued.
    pub async fn wait_for_completion(&self, scope: &Scope, timeout: Duration) -> Result<()> {
        retry::run_with_deadline(
            scope,
            |_attempt| async move {
                let status = self.status().await.map_err(|e| {
                    if matches!(e.root(), Error::MalformedResponse { .. }) {
                        e.permanent()
                    } else {
                        e
                    }
                })?;
                if status.is_idle() {
                    return Ok(());
                }
                debug!(pending = status.pending_moves, todo = status.todo_moves, "rebalance in progress");
                Err(Error::NotReady(format!(
                    "{} moves running, {} queued",
                    status.pending_moves, status.todo_moves
                )))
            },
            timeout,
        )
        .await
    }

    /// Move up to `batch` shards from `from` to `to` according to `plan`.
    ///
    /// Nothing is submitted while earlier moves are still in flight. Call
    /// repeatedly with a fresh plan until [`MigrationStep::Complete`].
    pub async fn migrate_member(
        &self,
        plan: &PlanState,
        from: &str,
        to: &str,
        batch: usize,
    ) -> Result<MigrationStep> {
        let status = self.status().await?;
        if !status.is_idle() {
            return Ok(MigrationStep::Busy(status));
        }

        let moves = migration_moves(plan, from, to, batch);
        if moves.is_empty() {
            info!(from, to, "member migration complete");
            return Ok(MigrationStep::Complete);
        }

        let count = moves.len();
        debug!(from, to, moves = count, "migrating shards");
        self.execute_moves(moves)
            .await
            .with_context(|| format!("migrating {} to {}", from, to))?;
        Ok(MigrationStep::Submitted(count))
    }
}
