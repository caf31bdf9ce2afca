//! In-process HTTP server standing in for cluster members.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A request as received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Body decoded as JSON; `Value::Null` when empty or not JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Value,
    pub headers: Vec<(String, String)>,
}

impl MockResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

type RouteKey = (String, String);

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<RouteKey, VecDeque<MockResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockState {
    /// Next queued response; the last one stays in place.
    fn next_response(&self, key: &RouteKey) -> Option<MockResponse> {
        let mut routes = self.routes.lock();
        let queue = routes.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

/// Server answering queued responses per `(method, path)`.
///
/// Responses are consumed in order; the last one stays and answers every
/// further request. Unknown routes answer 404. The server stops when the
/// handle is dropped.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: CancellationToken,
}

impl MockServer {
    /// Bind an ephemeral port and start serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());
        let shutdown = CancellationToken::new();

        let app = Router::new().fallback(handle).with_state(state.clone());
        let token = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
        });

        Self {
            addr,
            state,
            shutdown,
        }
    }

    /// Base URL, usable as an explicit member endpoint.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Queue a JSON response.
    pub fn respond(&self, method: &str, path: &str, status: u16, body: Value) {
        self.respond_with(method, path, MockResponse::new(status, body));
    }

    /// Queue a response with headers.
    pub fn respond_with(&self, method: &str, path: &str, response: MockResponse) {
        self.state
            .routes
            .lock()
            .entry((method.to_uppercase(), path.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Answer the version probe with 200.
    pub fn serve_version(&self) {
        self.respond(
            "GET",
            "/_api/version",
            200,
            json!({"server": "arango", "version": "3.11.4", "license": "enterprise"}),
        );
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    /// Requests received for one route.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method.eq_ignore_ascii_case(method) && r.path == path)
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.requests.lock().push(RecordedRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization,
        body: body.to_vec(),
    });

    let key = (method.as_str().to_string(), uri.path().to_string());
    let Some(canned) = state.next_response(&key) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": true, "code": 404, "errorMessage": "unknown route"})),
        )
            .into_response();
    };

    let status = StatusCode::from_u16(canned.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(canned.body)).into_response();
    for (name, value) in canned.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_keeps_last_response() {
        let server = MockServer::start().await;
        server.respond("GET", "/a", 503, json!({"n": 1}));
        server.respond("GET", "/a", 200, json!({"n": 2}));

        let http = reqwest::Client::new();
        let url = format!("{}/a?x=1", server.url());
        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(http.get(&url).send().await.unwrap().status().as_u16());
        }
        assert_eq!(statuses, [503, 200, 200]);

        let missing = http.get(format!("{}/b", server.url())).send().await.unwrap();
        assert_eq!(missing.status().as_u16(), 404);

        let recorded = server.requests_to("GET", "/a");
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0].query.as_deref(), Some("x=1"));
        assert_eq!(recorded[0].json(), Value::Null);
    }
}
