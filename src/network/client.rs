//! Authenticated member client.

use crate::error::Result;
use crate::network::connection::{Connection, Response};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};

/// Server identity returned by the version probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Product name.
    pub server: String,
    /// Server version.
    pub version: String,
    /// License flavour, when reported.
    #[serde(default)]
    pub license: Option<String>,
}

/// An authenticated client for one member or the cluster entry point.
#[derive(Debug, Clone)]
pub struct Client {
    conn: Connection,
}

impl Client {
    /// Wrap a connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Base URL of the endpoint.
    pub fn endpoint(&self) -> &Url {
        self.conn.endpoint()
    }

    /// Lightweight identity probe (`GET /_api/version`).
    pub async fn version(&self) -> Result<VersionInfo> {
        self.conn
            .get("/_api/version")
            .await?
            .expect_status(&[StatusCode::OK])?
            .json()
    }

    /// Send a request and check the status.
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        expected: &[StatusCode],
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        self.conn
            .send(method, path, body)
            .await?
            .expect_status(expected)
    }
}
