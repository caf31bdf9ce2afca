//! Configuration types for the orchestration core.

use std::time::Duration;

/// Port every cluster member listens on.
pub const DEFAULT_MEMBER_PORT: u16 = 8529;

/// Default wall-clock budget for one shard distribution collection.
pub const DEFAULT_DISTRIBUTION_BUDGET: Duration = Duration::from_secs(45);

/// Default auto-revert timeout for member maintenance mode.
pub const DEFAULT_MAINTENANCE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Configuration for connections to cluster members.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Port used for members whose endpoint is a bare host.
    pub port: u16,

    /// Whether requests carry a bearer token minted from the shared secret.
    pub authentication: bool,

    /// Name of the shared secret; defaults to `<deployment>-jwt`.
    pub secret_name: Option<String>,

    /// Lifetime of each minted token.
    pub token_ttl: Duration,

    /// Value of the `server_id` claim in minted tokens.
    pub token_server_id: String,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,

    /// Timeout for a single agency read.
    pub agency_timeout: Duration,

    /// Wall-clock budget for collecting shard distribution statistics.
    pub distribution_budget: Duration,

    /// Default auto-revert timeout for member maintenance mode.
    pub maintenance_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_MEMBER_PORT,
            authentication: true,
            secret_name: None,
            token_ttl: Duration::from_secs(3600),
            token_server_id: "shardctl".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            agency_timeout: Duration::from_secs(10),
            distribution_budget: DEFAULT_DISTRIBUTION_BUDGET,
            maintenance_timeout: DEFAULT_MAINTENANCE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the member port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable token authentication.
    pub fn with_authentication(mut self, enabled: bool) -> Self {
        self.authentication = enabled;
        self
    }

    /// Override the shared secret name.
    pub fn with_secret_name(mut self, name: impl Into<String>) -> Self {
        self.secret_name = Some(name.into());
        self
    }

    /// Set the token lifetime.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Set the `server_id` claim.
    pub fn with_token_server_id(mut self, id: impl Into<String>) -> Self {
        self.token_server_id = id.into();
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the agency read timeout.
    pub fn with_agency_timeout(mut self, timeout: Duration) -> Self {
        self.agency_timeout = timeout;
        self
    }

    /// Set the distribution collection budget.
    pub fn with_distribution_budget(mut self, budget: Duration) -> Self {
        self.distribution_budget = budget;
        self
    }

    /// Set the default maintenance timeout.
    pub fn with_maintenance_timeout(mut self, timeout: Duration) -> Self {
        self.maintenance_timeout = timeout;
        self
    }

    /// Resolve the shared secret name for a deployment.
    pub fn secret_name_for(&self, deployment: &str) -> String {
        self.secret_name
            .clone()
            .unwrap_or_else(|| format!("{}-jwt", deployment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 8529);
        assert!(config.authentication);
        assert_eq!(config.distribution_budget, Duration::from_secs(45));
        assert_eq!(config.maintenance_timeout, Duration::from_secs(900));
        assert_eq!(config.secret_name_for("prod"), "prod-jwt");
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new()
            .with_port(18529)
            .with_authentication(false)
            .with_secret_name("shared")
            .with_distribution_budget(Duration::from_secs(5));

        assert_eq!(config.port, 18529);
        assert!(!config.authentication);
        assert_eq!(config.secret_name_for("prod"), "shared");
        assert_eq!(config.distribution_budget, Duration::from_secs(5));
    }
}
