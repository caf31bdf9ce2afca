//! HTTP connections to cluster members.

use crate::config::ClientConfig;
use crate::error::{Error, NetworkError, Result};
use crate::network::auth::Authentication;
use reqwest::header::{HeaderMap, AUTHORIZATION, LOCATION};
use reqwest::{redirect, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Builds connections to member endpoints.
///
/// Two pooled HTTP clients are kept: one for plain HTTP and one for TLS
/// deployments, which serve self-signed certificates and are therefore not
/// verified. Redirects are never followed automatically.
#[derive(Debug, Clone)]
pub struct HttpConnectionFactory {
    plain: reqwest::Client,
    tls: reqwest::Client,
    port: u16,
}

impl HttpConnectionFactory {
    /// Create a factory from the client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let build = |insecure: bool| {
            reqwest::Client::builder()
                .redirect(redirect::Policy::none())
                .connect_timeout(config.connect_timeout)
                .timeout(config.request_timeout)
                .danger_accept_invalid_certs(insecure)
                .build()
                .map_err(NetworkError::ClientSetup)
        };

        Ok(Self {
            plain: build(false)?,
            tls: build(true)?,
            port: config.port,
        })
    }

    /// Resolve a member endpoint into a base URL.
    ///
    /// A bare host gets the scheme from `tls` and the configured port; an
    /// endpoint that already carries an `http://` or `https://` scheme is
    /// used verbatim.
    pub fn endpoint(&self, host: &str, tls: bool) -> Result<Url> {
        let host = host.trim();
        if host.is_empty() {
            return Err(NetworkError::InvalidEndpoint("empty host".into()).into());
        }

        let raw = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            let scheme = if tls { "https" } else { "http" };
            let host = if host.contains(':') && !host.starts_with('[') {
                format!("[{}]", host)
            } else {
                host.to_string()
            };
            format!("{}://{}:{}", scheme, host, self.port)
        };

        Url::parse(&raw)
            .map_err(|e| NetworkError::InvalidEndpoint(format!("{}: {}", raw, e)).into())
    }

    /// Open a connection to `endpoint` with the given credentials.
    pub fn connect(&self, endpoint: Url, auth: Authentication) -> Connection {
        let http = if endpoint.scheme() == "https" {
            self.tls.clone()
        } else {
            self.plain.clone()
        };
        Connection {
            http,
            endpoint,
            auth,
        }
    }
}

/// A low-level connection to one endpoint.
#[derive(Debug, Clone)]
pub struct Connection {
    http: reqwest::Client,
    endpoint: Url,
    auth: Authentication,
}

impl Connection {
    /// Base URL of the endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Whether requests carry credentials.
    pub fn is_authenticated(&self) -> bool {
        self.auth != Authentication::None
    }

    /// The same connection pointed at a different endpoint.
    pub fn with_endpoint(&self, endpoint: Url) -> Connection {
        Connection {
            http: self.http.clone(),
            endpoint,
            auth: self.auth.clone(),
        }
    }

    /// Send a request without a body.
    pub async fn get(&self, path: &str) -> Result<Response> {
        self.send::<()>(Method::GET, path, None).await
    }

    /// Send a request; `path` may carry a query string.
    pub async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self
            .endpoint
            .join(path)
            .map_err(|e| NetworkError::InvalidEndpoint(format!("{}{}: {}", self.endpoint, path, e)))?;
        let endpoint = self.endpoint.to_string();

        trace!(%method, %url, "sending request");
        let mut request = self.http.request(method, url);
        if let Some(value) = self.auth.header_value() {
            request = request.header(AUTHORIZATION, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let transport = |source| NetworkError::Transport {
            endpoint: endpoint.clone(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport)?.to_vec();

        Ok(Response {
            endpoint,
            status,
            headers,
            body,
        })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    endpoint: String,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    /// Endpoint the response came from.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Target of a redirect, if any.
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// Fail unless the status is one of `expected`.
    ///
    /// 401 becomes [`Error::Unauthorized`]; anything else unexpected becomes
    /// [`Error::UnexpectedStatus`] with the server's error message.
    pub fn expect_status(self, expected: &[StatusCode]) -> Result<Self> {
        if expected.contains(&self.status) {
            return Ok(self);
        }
        let message = self.error_message();
        if self.status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized(format!("{}: {}", self.endpoint, message)));
        }
        Err(Error::UnexpectedStatus {
            endpoint: self.endpoint,
            status: self.status.as_u16(),
            message,
        })
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|source| Error::MalformedResponse {
            endpoint: self.endpoint.clone(),
            source,
        })
    }

    /// Decode the `result` field of a `{"result": ...}` envelope.
    pub fn result<T: DeserializeOwned>(&self) -> Result<T> {
        self.json::<Envelope<T>>().map(|e| e.result)
    }

    fn error_message(&self) -> String {
        match serde_json::from_slice::<ErrorBody>(&self.body) {
            Ok(ErrorBody {
                error_message: Some(message),
            }) => message,
            _ => {
                let text = String::from_utf8_lossy(&self.body);
                let text = text.trim();
                if text.is_empty() {
                    self.status.to_string()
                } else {
                    text.chars().take(256).collect()
                }
            }
        }
    }
}
