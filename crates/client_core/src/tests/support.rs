//! Mock backend and fixtures shared by the unit tests.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header, HeaderMap, Method as HttpMethod, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use serde_json::{json, Value};
use shared::{
    domain::{Role, User},
    protocol::ResponseConvention,
};
use storage::{MemorySessionStore, SessionStore};
use tokio::{
    net::TcpListener,
    sync::{broadcast, Mutex},
};

use crate::{events::ClientEvent, gateway::ApiGateway, session::SessionState};

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
struct Reply {
    status: StatusCode,
    body: String,
    delay: Option<Duration>,
}

/// Catch-all backend answering canned bodies keyed by `METHOD /path`.
/// Unknown routes answer 404 with an empty body.
#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reply(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        self.insert(method, path, status, body.into(), None).await;
    }

    pub async fn reply_json(&self, method: &str, path: &str, body: Value) {
        self.insert(method, path, 200, body.to_string(), None).await;
    }

    pub async fn reply_delayed(&self, method: &str, path: &str, body: Value, delay: Duration) {
        self.insert(method, path, 200, body.to_string(), Some(delay))
            .await;
    }

    async fn insert(
        &self,
        method: &str,
        path: &str,
        status: u16,
        body: String,
        delay: Option<Duration>,
    ) {
        let status = StatusCode::from_u16(status).expect("valid status");
        self.replies
            .lock()
            .await
            .insert(format!("{method} {path}"), Reply { status, body, delay });
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .await
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    /// Serves on an ephemeral port and returns the base URL.
    pub async fn spawn(&self) -> String {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let app = Router::new().fallback(handle).with_state(self.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/api")
    }
}

async fn handle(
    State(backend): State<MockBackend>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let path = uri
        .path()
        .strip_prefix("/api")
        .unwrap_or(uri.path())
        .to_string();
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    backend.requests.lock().await.push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body,
    });

    let reply = backend
        .replies
        .lock()
        .await
        .get(&format!("{method} {path}"))
        .cloned();
    let Some(reply) = reply else {
        return (StatusCode::NOT_FOUND, String::new());
    };
    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }
    (reply.status, reply.body)
}

/// Base URL nothing listens on.
pub(crate) async fn closed_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}/api")
}

pub(crate) struct Fixture {
    pub store: Arc<MemorySessionStore>,
    pub events: broadcast::Sender<ClientEvent>,
    pub receiver: broadcast::Receiver<ClientEvent>,
    pub session: Arc<SessionState>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemorySessionStore::new());
        let (events, receiver) = broadcast::channel(256);
        let dyn_store: Arc<dyn SessionStore> = store.clone();
        let session = Arc::new(SessionState::new(dyn_store, events.clone()));
        Self {
            store,
            events,
            receiver,
            session,
        }
    }

    pub fn gateway(&self, base_url: &str, convention: ResponseConvention) -> Arc<ApiGateway> {
        Arc::new(
            ApiGateway::new(
                base_url,
                convention,
                Duration::from_secs(5),
                Arc::clone(&self.session),
                self.events.clone(),
            )
            .expect("gateway"),
        )
    }

    pub fn drain(&mut self) -> Vec<ClientEvent> {
        drain(&mut self.receiver)
    }
}

pub(crate) fn drain(receiver: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub(crate) fn toasts(events: &[ClientEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::Toast { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub(crate) fn alice() -> User {
    User::new(1, "alice", Role::User)
}

pub(crate) fn success_flag(data: Value) -> Value {
    json!({ "success": true, "message": "ok", "data": data })
}

pub(crate) fn status_code(data: Value) -> Value {
    json!({ "code": 200, "message": "ok", "data": data })
}
