//! Administrative server endpoints.
//!
//! Thin typed wrappers; each call targets whatever member the wrapped
//! [`Client`] points at. Cluster-scoped calls (license, inventory, job
//! cleanup) should go through the cluster client, key reloads through the
//! member whose keys changed.

use crate::error::{Result, ResultExt};
use crate::network::Client;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Options for a storage compaction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactOptions {
    /// Move data to the lowest possible level.
    pub change_level: bool,
    /// Also compact the bottom-most level.
    pub compact_bottom_most_level: bool,
}

/// Reported license state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LicenseStatus {
    Good,
    Expiring,
    Expired,
    ReadOnly,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseFeatures {
    /// Expiry as unix seconds.
    pub expires: i64,
}

/// License installed on the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub features: LicenseFeatures,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub version: u32,
    pub status: LicenseStatus,
    #[serde(default)]
    pub hash: Option<String>,
}

impl License {
    /// Expiry time, if representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.features.expires, 0)
    }
}

/// Hash identifying a key without revealing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHash {
    #[serde(default)]
    pub sha256: Option<String>,
}

/// At-rest encryption keys loaded by a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionDetails {
    #[serde(rename = "encryption-keys", default)]
    pub keys: Vec<KeyHash>,
}

/// JWT secrets loaded by a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtSecretDetails {
    #[serde(default)]
    pub active: Option<KeyHash>,
    #[serde(default)]
    pub passive: Vec<KeyHash>,
}

/// Collections and views of one database as seen by the cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterInventory {
    #[serde(default)]
    pub collections: Vec<Value>,
    #[serde(default)]
    pub views: Vec<Value>,
    #[serde(default)]
    pub tick: Option<String>,
}

/// Client for administrative endpoints.
#[derive(Debug, Clone)]
pub struct AdminClient {
    client: Client,
}

impl AdminClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Compact the storage engine's data (`PUT /_admin/compact`).
    pub async fn compact(&self, options: CompactOptions) -> Result<()> {
        self.client
            .request(Method::PUT, "/_admin/compact", Some(&options), &[StatusCode::OK])
            .await
            .context("compact")?;
        info!(endpoint = %self.client.endpoint(), ?options, "compaction finished");
        Ok(())
    }

    /// Read the installed license.
    pub async fn license(&self) -> Result<License> {
        self.client
            .request::<()>(Method::GET, "/_admin/license", None, &[StatusCode::OK])
            .await
            .context("read license")?
            .json()
    }

    /// Install a license key; `force` allows downgrades.
    pub async fn set_license(&self, license: &str, force: bool) -> Result<()> {
        let path = format!("/_admin/license?force={}", force);
        self.client
            .request(
                Method::PUT,
                &path,
                Some(license),
                &[StatusCode::OK, StatusCode::CREATED],
            )
            .await
            .context("install license")?;
        info!(force, "license installed");
        Ok(())
    }

    /// Hashes of the loaded encryption keys.
    pub async fn encryption(&self) -> Result<EncryptionDetails> {
        self.key_details(Method::GET, "/_admin/server/encryption")
            .await
            .context("read encryption keys")
    }

    /// Reload encryption keys from disk and return the new hashes.
    pub async fn refresh_encryption(&self) -> Result<EncryptionDetails> {
        let details: EncryptionDetails = self
            .key_details(Method::POST, "/_admin/server/encryption")
            .await
            .context("reload encryption keys")?;
        info!(keys = details.keys.len(), "encryption keys reloaded");
        Ok(details)
    }

    /// Hashes of the loaded JWT secrets.
    pub async fn jwt(&self) -> Result<JwtSecretDetails> {
        self.key_details(Method::GET, "/_admin/server/jwt")
            .await
            .context("read jwt secrets")
    }

    /// Reload JWT secrets from disk and return the new hashes.
    pub async fn refresh_jwt(&self) -> Result<JwtSecretDetails> {
        let details: JwtSecretDetails = self
            .key_details(Method::POST, "/_admin/server/jwt")
            .await
            .context("reload jwt secrets")?;
        info!(passive = details.passive.len(), "jwt secrets reloaded");
        Ok(details)
    }

    /// Drop async job results older than `before`.
    pub async fn cleanup_expired_jobs(&self, before: DateTime<Utc>) -> Result<()> {
        let path = format!("/_api/job/expired?stamp={}", before.timestamp());
        self.client
            .request::<()>(Method::DELETE, &path, None, &[StatusCode::OK])
            .await
            .context("cleanup expired jobs")?;
        debug!(stamp = before.timestamp(), "expired jobs removed");
        Ok(())
    }

    /// Cluster inventory of one database.
    pub async fn inventory(&self, database: &str) -> Result<ClusterInventory> {
        let path = format!("/_db/{}/_api/replication/clusterInventory", database);
        self.client
            .request::<()>(Method::GET, &path, None, &[StatusCode::OK])
            .await
            .with_context(|| format!("inventory of {}", database))?
            .json()
    }

    async fn key_details<T>(&self, method: Method, path: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.client
            .request::<()>(method, path, None, &[StatusCode::OK])
            .await?
            .result()
    }
}
