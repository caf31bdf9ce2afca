//! Multi-endpoint agency client.

use crate::error::{Error, Result, ResultExt};
use crate::network::{Connection, Response};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const READ_PATH: &str = "/_api/agency/read";

/// Client addressing every agent of the deployment.
///
/// Reads go to the agents in roster order. A follower answering with a
/// redirect is followed once to the leader it names; an agent that is
/// unavailable or unreachable is skipped in favour of the next one.
#[derive(Debug, Clone)]
pub struct AgencyClient {
    connections: Vec<Connection>,
    timeout: Duration,
}

impl AgencyClient {
    /// Create a client. An empty connection set is a configuration error.
    pub fn new(connections: Vec<Connection>, timeout: Duration) -> Result<Self> {
        if connections.is_empty() {
            return Err(Error::Config("agency client needs at least one endpoint".into()));
        }
        Ok(Self {
            connections,
            timeout,
        })
    }

    /// Agent endpoints in the order they are tried.
    pub fn endpoints(&self) -> Vec<&Url> {
        self.connections.iter().map(Connection::endpoint).collect()
    }

    /// Read one or more keys in a single transaction; returns the tree root.
    pub async fn read_raw(&self, keys: &[&str]) -> Result<Value> {
        let body = [keys];
        let mut last_error = None;

        for conn in &self.connections {
            match self.read_from(conn, &body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_unauthorized() => return Err(e.context("agency read")),
                Err(e) => {
                    warn!(endpoint = %conn.endpoint(), error = %e, "agency read failed, trying next agent");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Config("no agency endpoints".into()))
            .context("agency read failed on all agents"))
    }

    /// Read the value at `path` (`["arango", "Plan", "Collections"]`).
    ///
    /// Returns `None` when the key does not exist.
    pub async fn read_key<T: DeserializeOwned>(&self, path: &[&str]) -> Result<Option<T>> {
        let key = agency_key(path);
        let root = self.read_raw(&[key.as_str()]).await?;
        decode_at(root, path).with_context(|| format!("decoding {}", key))
    }

    async fn read_from(&self, conn: &Connection, body: &[&[&str]; 1]) -> Result<Value> {
        let response = self.post(conn, body).await?;

        let response = if response.status() == StatusCode::TEMPORARY_REDIRECT {
            let leader = response
                .location()
                .and_then(|l| Url::parse(l).ok())
                .ok_or_else(|| Error::UnexpectedStatus {
                    endpoint: response.endpoint().to_string(),
                    status: 307,
                    message: "redirect without a valid location".into(),
                })?;
            let mut base = leader;
            base.set_path("/");
            base.set_query(None);
            debug!(from = %conn.endpoint(), to = %base, "following agency leader redirect");
            self.post(&conn.with_endpoint(base), body).await?
        } else {
            response
        };

        let response = response.expect_status(&[StatusCode::OK])?;
        let values: Vec<Value> = response.json()?;
        values.into_iter().next().ok_or_else(|| {
            Error::Internal(format!("empty agency read result from {}", response.endpoint()))
        })
    }

    async fn post(&self, conn: &Connection, body: &[&[&str]; 1]) -> Result<Response> {
        match tokio::time::timeout(self.timeout, conn.send(Method::POST, READ_PATH, Some(body))).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout),
        }
    }
}

/// Build an agency key from path segments.
pub fn agency_key(path: &[&str]) -> String {
    format!("/{}", path.join("/"))
}

pub(crate) fn decode_at<T: DeserializeOwned>(mut root: Value, path: &[&str]) -> Result<Option<T>> {
    for segment in path {
        root = match root {
            Value::Object(mut map) => match map.remove(*segment) {
                Some(value) => value,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
    }
    serde_json::from_value(root)
        .map(Some)
        .map_err(|source| Error::MalformedResponse {
            endpoint: "agency".into(),
            source,
        })
}
