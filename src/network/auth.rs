//! Shared-secret lookup and bearer token minting.

use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Issuer claim expected by cluster members.
pub const TOKEN_ISSUER: &str = "arangodb";

/// Credentials attached to every request of a connection.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Authentication {
    /// No `Authorization` header.
    #[default]
    None,
    /// `Authorization: bearer <token>`.
    Bearer(String),
}

impl Authentication {
    /// Value of the `Authorization` header, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Authentication::None => None,
            Authentication::Bearer(token) => Some(format!("bearer {}", token)),
        }
    }
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authentication::None => f.write_str("None"),
            Authentication::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// External secret storage holding the cluster's shared secret.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Read a secret by name; `Ok(None)` when it does not exist.
    async fn shared_secret(&self, name: &str) -> Result<Option<String>>;
}

/// In-memory secret store.
#[derive(Debug, Default)]
pub struct StaticSecrets {
    secrets: RwLock<HashMap<String, String>>,
}

impl StaticSecrets {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret.
    pub fn with_secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or replace a secret.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets.write().insert(name.into(), value.into());
    }

    /// Remove a secret.
    pub fn remove(&self, name: &str) -> Option<String> {
        self.secrets.write().remove(name)
    }
}

#[async_trait]
impl SecretSource for StaticSecrets {
    async fn shared_secret(&self, name: &str) -> Result<Option<String>> {
        Ok(self.secrets.read().get(name).cloned())
    }
}

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'static str,
    server_id: &'a str,
    iat: i64,
    exp: i64,
}

/// Mints HS256 JSON web tokens from the shared secret.
pub struct TokenMinter {
    secret: String,
    server_id: String,
    ttl: Duration,
}

impl TokenMinter {
    /// Create a minter. An empty secret is a configuration error.
    pub fn new(secret: impl Into<String>, server_id: impl Into<String>, ttl: Duration) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::Config("shared secret is empty".into()));
        }
        Ok(Self {
            secret,
            server_id: server_id.into(),
            ttl,
        })
    }

    /// Mint a token valid from now for the configured lifetime.
    pub fn mint(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: TOKEN_ISSUER,
            server_id: &self.server_id,
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };
        let header = Header {
            alg: "HS256",
            typ: "JWT",
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Internal(format!("invalid signing key: {}", e)))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Mint a token and wrap it as bearer credentials.
    pub fn authentication(&self) -> Result<Authentication> {
        self.mint().map(Authentication::Bearer)
    }
}

impl fmt::Debug for TokenMinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenMinter")
            .field("server_id", &self.server_id)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_vec(value)
        .map_err(|e| Error::Internal(format!("token encoding failed: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(raw))
}
