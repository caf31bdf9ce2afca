//! Typed Plan and Current trees read from the agency.
//!
//! Both trees are nested `database -> collection -> shard -> servers`
//! mappings. Maps are ordered so traversal is deterministic; server lists
//! keep their agency order since index 0 is the shard leader.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Database name.
pub type DatabaseName = String;
/// Collection identifier (numeric string in the agency).
pub type CollectionId = String;
/// Shard name (`s10022`).
pub type ShardId = String;
/// Storage server identifier.
pub type ServerId = String;

/// Wildcard matching any server in shard queries.
pub const ANY_SERVER: &str = "*";

/// Replication factor of a collection: a replica count or `"satellite"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplicationFactor {
    /// Fixed number of replicas.
    Count(u64),
    /// Named mode; `"satellite"` replicates to every server.
    Named(String),
}

impl ReplicationFactor {
    /// Whether the collection lives on every server.
    pub fn is_satellite(&self) -> bool {
        matches!(self, ReplicationFactor::Named(n) if n == "satellite")
    }

    /// Replica count, if numeric.
    pub fn count(&self) -> Option<u64> {
        match self {
            ReplicationFactor::Count(n) => Some(*n),
            ReplicationFactor::Named(_) => None,
        }
    }
}

/// A collection as recorded in Plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub shards: BTreeMap<ShardId, Vec<ServerId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_concern: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replication_factor: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<ReplicationFactor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribute_shards_like: Option<CollectionId>,
}

impl PlanCollection {
    /// Write concern, falling back to the legacy `minReplicationFactor`.
    pub fn write_concern(&self) -> Option<u64> {
        self.write_concern.or(self.min_replication_factor)
    }

    /// Whether the collection is a satellite.
    pub fn is_satellite(&self) -> bool {
        self.replication_factor
            .as_ref()
            .map_or(false, ReplicationFactor::is_satellite)
    }
}

/// A shard as recorded in Current.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentShard {
    /// Servers holding an in-sync replica; index 0 is the leader.
    #[serde(default)]
    pub servers: Vec<ServerId>,
}

/// Desired placement: `database -> collection -> PlanCollection`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanState(pub BTreeMap<DatabaseName, BTreeMap<CollectionId, PlanCollection>>);

/// Observed placement: `database -> collection -> shard -> CurrentShard`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrentState(
    pub BTreeMap<DatabaseName, BTreeMap<CollectionId, BTreeMap<ShardId, CurrentShard>>>,
);

impl PlanState {
    /// Look up a collection.
    pub fn collection(&self, db: &str, col: &str) -> Option<&PlanCollection> {
        self.0.get(db)?.get(col)
    }

    /// Every collection as `(database, collection id, collection)`.
    pub fn collections(&self) -> impl Iterator<Item = (&str, &str, &PlanCollection)> {
        self.0.iter().flat_map(|(db, cols)| {
            cols.iter()
                .map(move |(id, col)| (db.as_str(), id.as_str(), col))
        })
    }

    /// Total number of planned shards.
    pub fn shard_count(&self) -> usize {
        self.collections().map(|(_, _, c)| c.shards.len()).sum()
    }
}

impl CurrentState {
    /// Look up a shard.
    pub fn shard(&self, db: &str, col: &str, shard: &str) -> Option<&CurrentShard> {
        self.0.get(db)?.get(col)?.get(shard)
    }

    /// Every shard as `(database, collection id, shard, current)`.
    pub fn shards(&self) -> impl Iterator<Item = (&str, &str, &str, &CurrentShard)> {
        self.0.iter().flat_map(|(db, cols)| {
            cols.iter().flat_map(move |(id, shards)| {
                shards
                    .iter()
                    .map(move |(name, shard)| (db.as_str(), id.as_str(), name.as_str(), shard))
            })
        })
    }
}

/// Location of a shard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShardLocation {
    pub database: DatabaseName,
    pub collection: CollectionId,
    pub shard: ShardId,
}

/// A shard located in Plan or Current together with its servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDetails {
    pub location: ShardLocation,
    pub servers: Vec<ServerId>,
}

/// Plan and Current read together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgencyState {
    pub plan: PlanState,
    pub current: CurrentState,
}

impl AgencyState {
    /// Create a state from both trees.
    pub fn new(plan: PlanState, current: CurrentState) -> Self {
        Self { plan, current }
    }

    /// Number of shard replicas each server holds in Current.
    pub fn shards_by_db_servers(&self) -> BTreeMap<ServerId, usize> {
        let mut result = BTreeMap::new();
        for (_, _, _, shard) in self.current.shards() {
            for server in &shard.servers {
                *result.entry(server.clone()).or_insert(0) += 1;
            }
        }
        result
    }

    /// Server holding the fewest replicas in Current; ties go to the
    /// smallest server id.
    pub fn db_server_with_lowest_shards(&self) -> Option<ServerId> {
        self.shards_by_db_servers()
            .into_iter()
            .min_by(|(a_id, a), (b_id, b)| a.cmp(b).then_with(|| a_id.cmp(b_id)))
            .map(|(id, _)| id)
    }

    /// Find a shard by name, looking in Plan first and then in Current.
    pub fn shard_details(&self, shard: &str) -> Option<ShardDetails> {
        let planned = self.plan.collections().find_map(|(db, col, c)| {
            c.shards.get(shard).map(|servers| ShardDetails {
                location: location(db, col, shard),
                servers: servers.clone(),
            })
        });
        planned.or_else(|| {
            self.current
                .shards()
                .find(|(_, _, name, _)| *name == shard)
                .map(|(db, col, name, s)| ShardDetails {
                    location: location(db, col, name),
                    servers: s.servers.clone(),
                })
        })
    }

    /// Whether Current holds exactly the planned servers for a shard,
    /// irrespective of order.
    pub fn is_shard_in_sync(&self, db: &str, col: &str, shard: &str, planned: &[ServerId]) -> bool {
        match self.current.shard(db, col, shard) {
            Some(current) => same_servers(&current.servers, planned),
            None => false,
        }
    }

    /// In-sync flag for every planned shard.
    pub fn shards_status(&self) -> BTreeMap<ShardId, bool> {
        let mut result = BTreeMap::new();
        for (db, col, c) in self.plan.collections() {
            for (shard, servers) in &c.shards {
                result.insert(shard.clone(), self.is_shard_in_sync(db, col, shard, servers));
            }
        }
        result
    }

    /// Every server named in Plan.
    pub fn plan_servers(&self) -> BTreeSet<ServerId> {
        self.plan
            .collections()
            .flat_map(|(_, _, c)| c.shards.values().flatten().cloned())
            .collect()
    }

    /// Every server planned as leader of at least one shard.
    pub fn plan_leader_servers(&self) -> BTreeSet<ServerId> {
        self.plan
            .collections()
            .flat_map(|(_, _, c)| c.shards.values().filter_map(|s| s.first().cloned()))
            .collect()
    }

    /// Planned shards of `server` (or of any server, with [`ANY_SERVER`])
    /// whose Current replica set differs from Plan.
    pub fn shards_not_in_sync(&self, server: &str) -> Vec<ShardLocation> {
        self.filter_shards(|db, col, shard, planned| {
            if server != ANY_SERVER && !planned.iter().any(|s| s == server) {
                return false;
            }
            !self.is_shard_in_sync(db, col, shard, planned)
        })
    }

    /// Planned shards whose write concern would break if `server` restarted.
    pub fn shards_blocking_restart(&self, server: &str) -> Vec<ShardLocation> {
        let plan_server_count = self.plan_servers().len() as i64;
        self.filter_shards(|db, col, shard, planned| {
            if !planned.iter().any(|s| s == server) {
                return false;
            }
            let Some(plan) = self.plan.collection(db, col) else {
                return false;
            };

            let in_sync: Vec<&ServerId> = self
                .current
                .shard(db, col, shard)
                .map(|c| c.servers.iter().filter(|s| planned.contains(s)).collect())
                .unwrap_or_default();
            let server_in_sync = in_sync.iter().any(|s| *s == server);
            let replicas = in_sync.len() as i64;

            if planned.len() == 1 && server_in_sync {
                return false;
            }

            let replication_factor = match &plan.replication_factor {
                None => replicas,
                Some(rf) if rf.is_satellite() => plan_server_count,
                Some(rf) => rf.count().map_or(replicas, |n| n as i64),
            };
            let mut write_concern = plan.write_concern().unwrap_or(1) as i64;
            if write_concern >= replication_factor {
                write_concern = replication_factor - 1;
            }

            if replicas >= write_concern && !server_in_sync {
                return false;
            }
            replicas <= write_concern
        })
    }

    fn filter_shards<F>(&self, mut keep: F) -> Vec<ShardLocation>
    where
        F: FnMut(&str, &str, &str, &[ServerId]) -> bool,
    {
        let mut result = Vec::new();
        for (db, col, c) in self.plan.collections() {
            for (shard, planned) in &c.shards {
                if keep(db, col, shard, planned) {
                    result.push(location(db, col, shard));
                }
            }
        }
        result
    }
}

fn location(db: &str, col: &str, shard: &str) -> ShardLocation {
    ShardLocation {
        database: db.to_string(),
        collection: col.to_string(),
        shard: shard.to_string(),
    }
}

fn same_servers(current: &[ServerId], planned: &[ServerId]) -> bool {
    current.len() == planned.len() && planned.iter().all(|s| current.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn servers(list: &[&str]) -> Vec<ServerId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// One collection `c1` in database `db` with the given write concern,
    /// replication factor equal to the planned server count.
    fn single_shard(wc: u64, plan: &[&str], current: &[&str]) -> AgencyState {
        let mut state = AgencyState::default();
        let collection = PlanCollection {
            shards: BTreeMap::from([("s1".to_string(), servers(plan))]),
            write_concern: Some(wc),
            replication_factor: Some(ReplicationFactor::Count(plan.len() as u64)),
            ..Default::default()
        };
        state
            .plan
            .0
            .entry("db".into())
            .or_default()
            .insert("c1".into(), collection);
        state
            .current
            .0
            .entry("db".into())
            .or_default()
            .entry("c1".into())
            .or_default()
            .insert("s1".into(), CurrentShard { servers: servers(current) });
        state
    }

    #[test]
    fn test_plan_decodes_agency_tree() {
        let plan: PlanState = serde_json::from_value(json!({
            "_system": {
                "10001": {
                    "name": "_users",
                    "shards": {"s10002": ["PRMR-a", "PRMR-b"]},
                    "replicationFactor": 2,
                    "minReplicationFactor": 1,
                    "isSystem": true
                },
                "10011": {
                    "name": "_apps",
                    "distributeShardsLike": "10001",
                    "shards": {"s10022": ["PRMR-a", "PRMR-b"]},
                    "replicationFactor": "satellite",
                    "writeConcern": 2
                }
            }
        }))
        .unwrap();

        let users = plan.collection("_system", "10001").unwrap();
        assert_eq!(users.write_concern(), Some(1));
        assert_eq!(users.replication_factor.as_ref().unwrap().count(), Some(2));

        let apps = plan.collection("_system", "10011").unwrap();
        assert_eq!(apps.write_concern(), Some(2));
        assert!(apps.is_satellite());
        assert_eq!(apps.distribute_shards_like.as_deref(), Some("10001"));
        assert_eq!(plan.shard_count(), 2);
    }

    #[test]
    fn test_current_decodes_and_keeps_order() {
        let current: CurrentState = serde_json::from_value(json!({
            "_system": {"10001": {"s10002": {
                "servers": ["PRMR-b", "PRMR-a"],
                "failoverCandidates": ["PRMR-b", "PRMR-a"],
                "errorNum": 0
            }}}
        }))
        .unwrap();
        let shard = current.shard("_system", "10001", "s10002").unwrap();
        assert_eq!(shard.servers, servers(&["PRMR-b", "PRMR-a"]));
    }

    #[test]
    fn test_shard_counts_and_lowest() {
        let mut state = single_shard(1, &["A", "B"], &["A", "B"]);
        state
            .current
            .0
            .get_mut("db")
            .unwrap()
            .get_mut("c1")
            .unwrap()
            .insert("s2".into(), CurrentShard { servers: servers(&["A", "C"]) });

        let counts = state.shards_by_db_servers();
        assert_eq!(counts["A"], 2);
        assert_eq!(counts["B"], 1);
        assert_eq!(state.db_server_with_lowest_shards().as_deref(), Some("B"));
    }

    #[test]
    fn test_in_sync_ignores_order() {
        let state = single_shard(1, &["A", "B"], &["B", "A"]);
        assert!(state.is_shard_in_sync("db", "c1", "s1", &servers(&["A", "B"])));
        assert!(state.shards_status()["s1"]);
        assert!(state.shards_not_in_sync(ANY_SERVER).is_empty());

        let state = single_shard(1, &["A", "B"], &["B"]);
        assert!(!state.shards_status()["s1"]);
        assert_eq!(state.shards_not_in_sync("A").len(), 1);
        assert!(state.shards_not_in_sync("C").is_empty());
    }

    #[test]
    fn test_plan_servers_and_leaders() {
        let state = single_shard(1, &["B", "A"], &["B", "A"]);
        assert_eq!(
            state.plan_servers().into_iter().collect::<Vec<_>>(),
            servers(&["A", "B"])
        );
        assert_eq!(
            state.plan_leader_servers().into_iter().collect::<Vec<_>>(),
            servers(&["B"])
        );
    }

    #[test]
    fn test_shard_details_prefers_plan() {
        let state = single_shard(1, &["A", "B"], &["B"]);
        let details = state.shard_details("s1").unwrap();
        assert_eq!(details.servers, servers(&["A", "B"]));
        assert_eq!(details.location.collection, "c1");
        assert!(state.shard_details("s9").is_none());
    }

    #[test]
    fn test_restart_blocking() {
        let state = single_shard(1, &["A", "B"], &["B"]);
        assert!(state.shards_blocking_restart("A").is_empty());
        assert_eq!(state.shards_blocking_restart("B").len(), 1);

        let state = single_shard(2, &["A", "B", "C"], &["B"]);
        for server in ["A", "B", "C"] {
            assert_eq!(state.shards_blocking_restart(server).len(), 1, "{server}");
        }

        let state = single_shard(2, &["A", "B", "C"], &["B", "C"]);
        assert!(state.shards_blocking_restart("A").is_empty());
        assert_eq!(state.shards_blocking_restart("B").len(), 1);

        let state = single_shard(1, &["A"], &["A"]);
        assert!(state.shards_blocking_restart("A").is_empty());
        assert!(state.shards_blocking_restart("Z").is_empty());
    }
}
