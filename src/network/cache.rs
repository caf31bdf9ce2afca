//! Cache of authenticated clients keyed by member.
//!
//! Each key owns a slot guarded by its own async mutex, so rebuilding the
//! client of one member never blocks lookups of another. A slot moves
//! through `Uninitialized -> Live -> Invalidated -> Live`: a probe that fails
//! with *unauthorized* invalidates the slot and the client is rebuilt once
//! with freshly minted credentials. A live client whose member moved to a
//! new endpoint is replaced in place, and slots of members that left the
//! roster are pruned on lookup.

use crate::agency::AgencyClient;
use crate::config::ClientConfig;
use crate::error::{Error, Result, ResultExt};
use crate::network::auth::{Authentication, SecretSource, TokenMinter};
use crate::network::client::Client;
use crate::network::connection::{Connection, HttpConnectionFactory};
use crate::types::{MemberRoster, ServerRole};
use parking_lot::Mutex;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Member { role: ServerRole, id: String },
    Cluster,
}

#[derive(Debug)]
enum SlotState {
    Uninitialized,
    Live(Client),
    Invalidated,
}

type Slot = Arc<tokio::sync::Mutex<SlotState>>;

/// Resolves members to live, authenticated clients.
pub struct ClientCache {
    roster: Arc<dyn MemberRoster>,
    secrets: Arc<dyn SecretSource>,
    factory: HttpConnectionFactory,
    config: ClientConfig,
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl ClientCache {
    /// Create a cache over a roster and a secret source.
    pub fn new(
        roster: Arc<dyn MemberRoster>,
        secrets: Arc<dyn SecretSource>,
        config: ClientConfig,
    ) -> Result<Self> {
        let factory = HttpConnectionFactory::new(&config)?;
        Ok(Self {
            roster,
            secrets,
            factory,
            config,
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Roster in use.
    pub fn roster(&self) -> &Arc<dyn MemberRoster> {
        &self.roster
    }

    /// Number of slots currently held.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Unauthenticated connection to a member, without a probe.
    pub async fn get_raw(&self, role: ServerRole, id: &str) -> Result<Connection> {
        let url = self.member_url(role, id)?;
        Ok(self.factory.connect(url, Authentication::None))
    }

    /// Authenticated client for a member.
    ///
    /// The client is probed with the version endpoint. On *unauthorized* it
    /// is rebuilt once and the rebuilt client is returned without a second
    /// probe. Other probe failures are logged and the client is returned.
    pub async fn get(&self, role: ServerRole, id: &str) -> Result<Client> {
        let url = self.member_url(role, id)?;
        self.prune();
        let key = CacheKey::Member {
            role,
            id: id.to_string(),
        };
        self.get_or_rebuild(key, url)
            .await
            .with_context(|| format!("client for {} {}", role, id))
    }

    /// Authenticated client for the cluster entry point.
    pub async fn get_cluster(&self) -> Result<Client> {
        let url = self
            .factory
            .endpoint(&self.roster.cluster_endpoint(), self.roster.tls_enabled())?;
        self.get_or_rebuild(CacheKey::Cluster, url)
            .await
            .context("client for cluster endpoint")
    }

    /// Agency client over the agents in the roster, optionally filtered to `ids`.
    ///
    /// Fails without any network call when no agent matches.
    pub async fn get_agency(&self, ids: &[&str]) -> Result<AgencyClient> {
        let agents: Vec<_> = self
            .roster
            .members(ServerRole::Agent)
            .into_iter()
            .filter(|m| ids.is_empty() || ids.contains(&m.id.as_str()))
            .collect();
        if agents.is_empty() {
            return Err(Error::Config("no agents found".into()));
        }

        let auth = self.authentication().await?;
        let tls = self.roster.tls_enabled();
        let connections = agents
            .iter()
            .map(|m| {
                let url = self.factory.endpoint(&m.endpoint, tls)?;
                Ok(self.factory.connect(url, auth.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        AgencyClient::new(connections, self.config.agency_timeout)
    }

    /// Drop slots of members that left the roster; returns how many.
    pub fn prune(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, _| match key {
            CacheKey::Member { role, id } => self.roster.member(*role, id).is_some(),
            CacheKey::Cluster => true,
        });
        let removed = before - slots.len();
        if removed > 0 {
            debug!(removed, "pruned clients of departed members");
        }
        removed
    }

    fn member_url(&self, role: ServerRole, id: &str) -> Result<Url> {
        let member = self
            .roster
            .member(role, id)
            .ok_or_else(|| Error::Config(format!("{} member {} not found", role, id)))?;
        self.factory.endpoint(&member.endpoint, self.roster.tls_enabled())
    }

    fn slot(&self, key: CacheKey) -> Slot {
        self.slots
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(SlotState::Uninitialized)))
            .clone()
    }

    async fn get_or_rebuild(&self, key: CacheKey, url: Url) -> Result<Client> {
        let slot = self.slot(key);
        let mut state = slot.lock().await;

        let live = match &*state {
            SlotState::Live(client) if client.endpoint() == &url => Some(client.clone()),
            SlotState::Live(client) => {
                debug!(from = %client.endpoint(), to = %url, "endpoint changed, dropping client");
                None
            }
            SlotState::Uninitialized | SlotState::Invalidated => None,
        };
        let client = match live {
            Some(client) => client,
            None => {
                let client = self.build(url.clone()).await?;
                debug!(endpoint = %url, "client created");
                *state = SlotState::Live(client.clone());
                client
            }
        };

        match client.version().await {
            Ok(_) => Ok(client),
            Err(e) if e.is_unauthorized() => {
                info!(endpoint = %url, "probe unauthorized, rebuilding client");
                *state = SlotState::Invalidated;
                let client = self.build(url).await?;
                *state = SlotState::Live(client.clone());
                Ok(client)
            }
            Err(e) => {
                warn!(endpoint = %url, error = %e, "version probe failed");
                Ok(client)
            }
        }
    }

    async fn build(&self, url: Url) -> Result<Client> {
        let auth = self.authentication().await?;
        Ok(Client::new(self.factory.connect(url, auth)))
    }

    async fn authentication(&self) -> Result<Authentication> {
        if !self.config.authentication {
            return Ok(Authentication::None);
        }
        let name = self.config.secret_name_for(&self.roster.deployment_name());
        let secret = self
            .secrets
            .shared_secret(&name)
            .await?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config(format!("shared secret {} is missing or empty", name)))?;
        TokenMinter::new(secret, self.config.token_server_id.clone(), self.config.token_ttl)?
            .authentication()
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("deployment", &self.roster.deployment_name())
            .field("slots", &self.slot_count())
            .finish_non_exhaustive()
    }
}
