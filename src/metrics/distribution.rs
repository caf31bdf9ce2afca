//! Shard distribution: Plan versus Current placement per server.
//!
//! [`DistributionReport::compute`] is a pure function over the two agency
//! trees. For every storage server it counts planned replicas, current
//! replicas and current leaderships (index 0 of a Current server list). It
//! also records, for every current placement, whether Plan expects that
//! server to hold the shard, and classifies each shard against its
//! collection's write concern.
//!
//! [`DistributionCollector`] wraps the computation with the agency reads,
//! bounded by a wall-clock budget, and pushes the result to a sink.

use super::{Counter, MetricDescriptor, MetricsSink, ValueKind};
use crate::agency::{self, CurrentState, PlanState};
use crate::error::{Error, Result};
use crate::network::ClientCache;
use crate::retry::{self, Scope};
use crate::types::ServerRole;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-collection write concern and replication factor.
pub const COLLECTION_CONFIG: MetricDescriptor = MetricDescriptor::new(
    "cluster_collection_config",
    "Collection replication settings",
    &["deployment", "database", "collection", "type"],
);

/// 1 when a current placement is also planned, 0 otherwise.
pub const SHARD_DISTRIBUTION: MetricDescriptor = MetricDescriptor::new(
    "cluster_shard_distribution",
    "Current shard placement converged to Plan",
    &["deployment", "database", "collection", "shard", "server", "leader"],
);

/// Shard health relative to write concern.
pub const SHARD_CONDITIONS: MetricDescriptor = MetricDescriptor::new(
    "cluster_shard_conditions",
    "Shard replication condition",
    &["deployment", "database", "collection", "shard", "condition"],
);

/// Per-server shard counts and shares.
pub const SERVER_SHARDS: MetricDescriptor = MetricDescriptor::new(
    "cluster_server_shards",
    "Shards per server",
    &["deployment", "server", "type"],
);

/// Cluster-wide shard totals.
pub const CLUSTER_SHARDS: MetricDescriptor = MetricDescriptor::new(
    "cluster_shards",
    "Shard totals",
    &["deployment", "resource", "type"],
);

/// Failed distribution collections.
pub const COLLECTION_ERRORS: MetricDescriptor = MetricDescriptor::new(
    "cluster_distribution_errors_total",
    "Failed shard distribution collections",
    &["deployment"],
);

/// One of the three per-server counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardCountKind {
    Planned,
    Current,
    Leader,
}

impl ShardCountKind {
    pub const ALL: [ShardCountKind; 3] = [
        ShardCountKind::Planned,
        ShardCountKind::Current,
        ShardCountKind::Leader,
    ];

    /// Label of the absolute count.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardCountKind::Planned => "Planned",
            ShardCountKind::Current => "Current",
            ShardCountKind::Leader => "Leader",
        }
    }

    /// Label of the share of the cluster total.
    pub fn percentage_label(&self) -> &'static str {
        match self {
            ShardCountKind::Planned => "PercentagePlanned",
            ShardCountKind::Current => "PercentageCurrent",
            ShardCountKind::Leader => "PercentageLeader",
        }
    }
}

/// Shard counters of one server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerShards {
    pub planned: u64,
    pub current: u64,
    pub leader: u64,
}

impl ServerShards {
    /// Counter by kind.
    pub fn get(&self, kind: ShardCountKind) -> u64 {
        match kind {
            ShardCountKind::Planned => self.planned,
            ShardCountKind::Current => self.current,
            ShardCountKind::Leader => self.leader,
        }
    }

    fn add(&mut self, other: &ServerShards) {
        self.planned += other.planned;
        self.current += other.current;
        self.leader += other.leader;
    }
}

/// Health of a shard relative to its write concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardCondition {
    /// More replicas than the write concern.
    Healthy,
    /// Exactly as many replicas as the write concern.
    AtMinimumReplicationFactor,
    /// Fewer replicas than the write concern.
    Offline,
}

impl ShardCondition {
    /// Classify a shard with `replicas` current servers.
    pub fn classify(replicas: usize, write_concern: u64) -> Self {
        let replicas = replicas as u64;
        if replicas > write_concern {
            ShardCondition::Healthy
        } else if replicas == write_concern {
            ShardCondition::AtMinimumReplicationFactor
        } else {
            ShardCondition::Offline
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShardCondition::Healthy => "Healthy",
            ShardCondition::AtMinimumReplicationFactor => "AtMinReplicationFactor",
            ShardCondition::Offline => "Offline",
        }
    }
}

/// A current replica of a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPlacement {
    pub database: String,
    pub collection: String,
    pub shard: String,
    pub server: String,
    pub leader: bool,
    /// Whether Plan also places the shard on this server.
    pub converged: bool,
}

/// Condition of one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardHealth {
    pub database: String,
    pub collection: String,
    pub shard: String,
    pub condition: ShardCondition,
}

/// Replication settings of one planned collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    pub database: String,
    pub collection: String,
    pub write_concern: Option<u64>,
    pub replication_factor: Option<u64>,
}

/// Result of comparing Plan against Current.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributionReport {
    /// Counters per server, including known servers without shards.
    pub servers: BTreeMap<String, ServerShards>,
    /// Sums over all servers.
    pub totals: ServerShards,
    pub placements: Vec<ShardPlacement>,
    pub health: Vec<ShardHealth>,
    pub collections: Vec<CollectionConfig>,
}

impl DistributionReport {
    /// Compare Plan against Current.
    ///
    /// `db_servers` seeds one entry per known storage server so that servers
    /// without shards still report zeros. Current entries whose database or
    /// collection is no longer planned are skipped.
    pub fn compute<S: AsRef<str>>(plan: &PlanState, current: &CurrentState, db_servers: &[S]) -> Self {
        let mut report = DistributionReport::default();
        for server in db_servers {
            report.servers.entry(server.as_ref().to_string()).or_default();
        }

        let mut planned: HashMap<(&str, &str, &str), HashSet<&str>> = HashMap::new();
        for (db, col_id, collection) in plan.collections() {
            let name = collection.name.as_deref().unwrap_or(col_id);
            let replication_factor = collection.replication_factor.as_ref().and_then(|rf| rf.count());
            if collection.write_concern().is_some() || replication_factor.is_some() {
                report.collections.push(CollectionConfig {
                    database: db.to_string(),
                    collection: name.to_string(),
                    write_concern: collection.write_concern(),
                    replication_factor,
                });
            }

            for (shard, servers) in &collection.shards {
                let entry = planned.entry((db, col_id, shard.as_str())).or_default();
                for server in servers {
                    report.servers.entry(server.clone()).or_default().planned += 1;
                    entry.insert(server.as_str());
                }
            }
        }

        for (db, col_id, shard, replicas) in current.shards() {
            let Some(collection) = plan.collection(db, col_id) else {
                continue;
            };
            let name = collection.name.as_deref().unwrap_or(col_id);
            let planned_servers = planned.get(&(db, col_id, shard));

            if let Some(leader) = replicas.servers.first() {
                report.servers.entry(leader.clone()).or_default().leader += 1;
            }
            for (index, server) in replicas.servers.iter().enumerate() {
                report.servers.entry(server.clone()).or_default().current += 1;
                report.placements.push(ShardPlacement {
                    database: db.to_string(),
                    collection: name.to_string(),
                    shard: shard.to_string(),
                    server: server.clone(),
                    leader: index == 0,
                    converged: planned_servers.map_or(false, |s| s.contains(server.as_str())),
                });
            }

            if let Some(write_concern) = collection.write_concern() {
                report.health.push(ShardHealth {
                    database: db.to_string(),
                    collection: name.to_string(),
                    shard: shard.to_string(),
                    condition: ShardCondition::classify(replicas.servers.len(), write_concern),
                });
            }
        }

        for shards in report.servers.values() {
            report.totals.add(shards);
        }
        report
    }

    /// Share of the cluster total held by `server`, in `[0, 1]`.
    ///
    /// `None` when the server is unknown or the cluster total is zero.
    pub fn percentage(&self, server: &str, kind: ShardCountKind) -> Option<f64> {
        let shards = self.servers.get(server)?;
        let total = self.totals.get(kind);
        if total == 0 {
            return None;
        }
        Some(shards.get(kind) as f64 / total as f64)
    }

    /// Push every statistic to `sink`, labelled with the deployment name.
    pub fn emit(&self, deployment: &str, sink: &dyn MetricsSink) {
        let gauge = |descriptor: &MetricDescriptor, value: f64, labels: &[&str]| {
            sink.collect(descriptor, ValueKind::Gauge, value, labels);
        };

        for config in &self.collections {
            let (db, col) = (config.database.as_str(), config.collection.as_str());
            if let Some(wc) = config.write_concern {
                gauge(&COLLECTION_CONFIG, wc as f64, &[deployment, db, col, "WriteConcern"]);
            }
            if let Some(rf) = config.replication_factor {
                gauge(&COLLECTION_CONFIG, rf as f64, &[deployment, db, col, "ReplicationFactor"]);
            }
        }

        for p in &self.placements {
            let leader = if p.leader { "true" } else { "false" };
            let value = if p.converged { 1.0 } else { 0.0 };
            gauge(
                &SHARD_DISTRIBUTION,
                value,
                &[
                    deployment,
                    p.database.as_str(),
                    p.collection.as_str(),
                    p.shard.as_str(),
                    p.server.as_str(),
                    leader,
                ],
            );
        }

        for h in &self.health {
            gauge(
                &SHARD_CONDITIONS,
                1.0,
                &[
                    deployment,
                    h.database.as_str(),
                    h.collection.as_str(),
                    h.shard.as_str(),
                    h.condition.as_str(),
                ],
            );
        }

        for (server, shards) in &self.servers {
            let server = server.as_str();
            for kind in ShardCountKind::ALL {
                gauge(&SERVER_SHARDS, shards.get(kind) as f64, &[deployment, server, kind.as_str()]);
                if let Some(share) = self.percentage(server, kind) {
                    gauge(&SERVER_SHARDS, share, &[deployment, server, kind.percentage_label()]);
                }
            }
        }

        for kind in ShardCountKind::ALL {
            gauge(&CLUSTER_SHARDS, self.totals.get(kind) as f64, &[deployment, "Shards", kind.as_str()]);
        }
    }
}

/// Periodic shard distribution collection for one deployment.
pub struct DistributionCollector {
    cache: Arc<ClientCache>,
    budget: Duration,
    errors: Counter,
}

impl DistributionCollector {
    /// Create a collector using the cache's configured budget.
    pub fn new(cache: Arc<ClientCache>) -> Self {
        let budget = cache.config().distribution_budget;
        Self {
            cache,
            budget,
            errors: Counter::new(COLLECTION_ERRORS),
        }
    }

    /// Override the wall-clock budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Number of failed collections so far.
    pub fn errors(&self) -> u64 {
        self.errors.get()
    }

    /// Read Plan and Current, compute the report and push it to `sink`.
    ///
    /// On failure the error counter is incremented and the error returned;
    /// nothing but the counter is emitted.
    pub async fn collect(&self, sink: &dyn MetricsSink) -> Result<DistributionReport> {
        let deployment = self.cache.roster().deployment_name();
        let scope = Scope::with_timeout(self.budget);

        let result = self.compute(&scope).await;
        if let Err(e) = &result {
            self.errors.inc();
            warn!(deployment = %deployment, error = %e, "shard distribution collection failed");
        }
        self.errors.collect(sink, &[deployment.as_str()]);

        let report = result?;
        report.emit(&deployment, sink);
        debug!(
            deployment = %deployment,
            servers = report.servers.len(),
            planned = report.totals.planned,
            current = report.totals.current,
            "shard distribution collected"
        );
        Ok(report)
    }

    async fn compute(&self, scope: &Scope) -> Result<DistributionReport> {
        let cache = &self.cache;
        let state = retry::run_with_deadline(
            scope,
            |_attempt| async move {
                let agency = cache.get_agency(&[]).await.map_err(permanent_if_fatal)?;
                agency::fetch_state(&agency).await.map_err(permanent_if_fatal)
            },
            self.budget,
        )
        .await?;

        let db_servers: Vec<String> = cache
            .roster()
            .members(ServerRole::DbServer)
            .into_iter()
            .map(|m| m.id)
            .collect();
        Ok(DistributionReport::compute(
            &state.plan,
            &state.current,
            db_servers.as_slice(),
        ))
    }
}

fn permanent_if_fatal(err: Error) -> Error {
    let fatal = matches!(err.root(), Error::Config(_) | Error::MalformedResponse { .. });
    if fatal {
        err.permanent()
    } else {
        err
    }
}
