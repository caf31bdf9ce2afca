//! Integration suites driving the real HTTP stack.
//!
//! Every suite runs against [`MockServer`] instances standing in for
//! agents, storage servers and the cluster entry point. Members are put in
//! the roster with the mock's full URL, which the connection layer uses
//! verbatim.

mod mock_server;

mod admin_tests;
mod distribution_tests;

pub use mock_server::{MockResponse, MockServer, RecordedRequest};

use crate::config::ClientConfig;
use crate::network::{ClientCache, StaticSecrets};
use crate::types::{ClusterMember, ServerRole, StaticRoster};
use std::sync::Arc;
use std::time::Duration;

/// Deployment name used by every suite.
pub const DEPLOYMENT: &str = "prod";

/// Shared secret installed by [`TestDeployment::with_auth`].
pub const SHARED_SECRET: &str = "s3cr3t";

/// Roster, secrets and client cache wired together.
pub struct TestDeployment {
    pub roster: Arc<StaticRoster>,
    pub secrets: Arc<StaticSecrets>,
    pub cache: Arc<ClientCache>,
}

impl TestDeployment {
    /// Deployment without authentication.
    pub fn new(cluster: &MockServer, members: &[(&str, ServerRole, &MockServer)]) -> Self {
        Self::build(cluster, members, test_config().with_authentication(false), StaticSecrets::new())
    }

    /// Deployment with token authentication and the shared secret installed.
    pub fn with_auth(cluster: &MockServer, members: &[(&str, ServerRole, &MockServer)]) -> Self {
        let secrets = StaticSecrets::new().with_secret(format!("{}-jwt", DEPLOYMENT), SHARED_SECRET);
        Self::build(cluster, members, test_config(), secrets)
    }

    /// Deployment with an explicit configuration and secret store.
    pub fn build(
        cluster: &MockServer,
        members: &[(&str, ServerRole, &MockServer)],
        config: ClientConfig,
        secrets: StaticSecrets,
    ) -> Self {
        let roster = Arc::new(StaticRoster::new(DEPLOYMENT, cluster.url()).with_members(
            members
                .iter()
                .map(|(id, role, server)| ClusterMember::new(*id, *role, server.url())),
        ));
        let secrets = Arc::new(secrets);
        let cache = Arc::new(ClientCache::new(roster.clone(), secrets.clone(), config).unwrap());
        Self {
            roster,
            secrets,
            cache,
        }
    }
}

/// Short timeouts so failing suites finish quickly.
pub fn test_config() -> ClientConfig {
    ClientConfig::new()
        .with_connect_timeout(Duration::from_secs(2))
        .with_request_timeout(Duration::from_secs(5))
        .with_agency_timeout(Duration::from_secs(2))
        .with_distribution_budget(Duration::from_secs(5))
}

/// Install a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
