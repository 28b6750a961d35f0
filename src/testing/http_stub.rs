//! Local HTTP server with canned routes for exercising network-facing handlers.

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// What a route answers with
#[derive(Debug, Clone)]
pub enum StubResponse {
    Reply {
        status: u16,
        content_type: &'static str,
        body: String,
    },
    /// Accept the request and never answer
    Hang,
}

impl StubResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self::Reply {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::Reply {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }

    pub fn hang() -> Self {
        Self::Hang
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

struct StubState {
    routes: Vec<(String, StubResponse)>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Serves canned responses keyed by request path (query strings ignored).
/// Unknown paths get a 404. The server stops when dropped.
pub struct StubServer {
    addr: SocketAddr,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(routes: Vec<(&str, StubResponse)>) -> std::io::Result<Self> {
        let state = Arc::new(StubState {
            routes: routes
                .into_iter()
                .map(|(path, response)| (path.to_string(), response))
                .collect(),
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .fallback(respond)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    if let Ok(mut log) = state.requests.lock() {
        log.push(RecordedRequest {
            method: method.to_string(),
            path: path.clone(),
            headers: headers
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        v.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect(),
            body,
        });
    }

    let response = state
        .routes
        .iter()
        .find(|(route, _)| *route == path)
        .map(|(_, response)| response.clone())
        .unwrap_or_else(|| StubResponse::text(404, "not found"));

    match response {
        StubResponse::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        StubResponse::Reply {
            status,
            content_type,
            body,
        } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
    }
}
