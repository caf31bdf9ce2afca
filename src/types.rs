//! Core types used throughout the orchestration core.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a cluster member (e.g. `PRMR-1a2b3c4d`).
pub type MemberId = String;

/// Role a member plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    /// Standalone server outside a cluster.
    Single,
    /// Member of the consensus-backed configuration store.
    Agent,
    /// Cluster entry point routing requests to storage members.
    Coordinator,
    /// Storage member holding shard data.
    #[serde(rename = "dbserver")]
    DbServer,
    /// Replication master.
    SyncMaster,
    /// Replication worker.
    SyncWorker,
}

impl ServerRole {
    /// All roles, in reporting order.
    pub const ALL: [ServerRole; 6] = [
        ServerRole::Single,
        ServerRole::Agent,
        ServerRole::Coordinator,
        ServerRole::DbServer,
        ServerRole::SyncMaster,
        ServerRole::SyncWorker,
    ];

    /// Lowercase role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::Single => "single",
            ServerRole::Agent => "agent",
            ServerRole::Coordinator => "coordinator",
            ServerRole::DbServer => "dbserver",
            ServerRole::SyncMaster => "syncmaster",
            ServerRole::SyncWorker => "syncworker",
        }
    }

    /// Whether members of this role hold shard data.
    pub fn is_storage(&self) -> bool {
        matches!(self, ServerRole::DbServer)
    }

    /// Whether members of this role belong to the replication tier.
    pub fn is_sync(&self) -> bool {
        matches!(self, ServerRole::SyncMaster | ServerRole::SyncWorker)
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member of the cluster as reported by the deployment status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    /// Member identifier.
    pub id: MemberId,
    /// Role of the member.
    pub role: ServerRole,
    /// Host name, or a full URL overriding scheme and port.
    pub endpoint: String,
}

impl ClusterMember {
    /// Create a new member.
    pub fn new(id: impl Into<MemberId>, role: ServerRole, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            endpoint: endpoint.into(),
        }
    }
}

/// Live view of the deployment's members.
///
/// The roster is owned by whoever watches the deployment; this crate only
/// reads it, and reads it again on every lookup so that member changes are
/// picked up without rebuilding the cache.
pub trait MemberRoster: Send + Sync {
    /// Deployment name; keys the shared secret.
    fn deployment_name(&self) -> String;

    /// Whether members serve TLS.
    fn tls_enabled(&self) -> bool;

    /// Host of the cluster-wide entry point.
    fn cluster_endpoint(&self) -> String;

    /// Members with the given role, in roster order.
    fn members(&self, role: ServerRole) -> Vec<ClusterMember>;

    /// Look up one member.
    fn member(&self, role: ServerRole, id: &str) -> Option<ClusterMember> {
        self.members(role).into_iter().find(|m| m.id == id)
    }
}

/// In-memory roster for embedding and tests.
#[derive(Debug)]
pub struct StaticRoster {
    name: String,
    tls: bool,
    cluster_endpoint: String,
    members: RwLock<Vec<ClusterMember>>,
}

impl StaticRoster {
    /// Create an empty roster.
    pub fn new(name: impl Into<String>, cluster_endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tls: false,
            cluster_endpoint: cluster_endpoint.into(),
            members: RwLock::new(Vec::new()),
        }
    }

    /// Enable or disable TLS.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Add members.
    pub fn with_members(self, members: impl IntoIterator<Item = ClusterMember>) -> Self {
        self.members.write().extend(members);
        self
    }

    /// Add or replace a member.
    pub fn upsert(&self, member: ClusterMember) {
        let mut members = self.members.write();
        match members
            .iter_mut()
            .find(|m| m.role == member.role && m.id == member.id)
        {
            Some(existing) => *existing = member,
            None => members.push(member),
        }
    }

    /// Remove a member, returning it if present.
    pub fn remove(&self, role: ServerRole, id: &str) -> Option<ClusterMember> {
        let mut members = self.members.write();
        let pos = members.iter().position(|m| m.role == role && m.id == id)?;
        Some(members.remove(pos))
    }

    /// Number of members across all roles.
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// Whether the roster has no members.
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}

impl MemberRoster for StaticRoster {
    fn deployment_name(&self) -> String {
        self.name.clone()
    }

    fn tls_enabled(&self) -> bool {
        self.tls
    }

    fn cluster_endpoint(&self) -> String {
        self.cluster_endpoint.clone()
    }

    fn members(&self, role: ServerRole) -> Vec<ClusterMember> {
        self.members
            .read()
            .iter()
            .filter(|m| m.role == role)
            .cloned()
            .collect()
    }
}
