use std::{sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde_json::Value;
use shared::{
    error::{ApiFailure, FailureKind},
    protocol::{ApiResponse, ResponseConvention},
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    events::{ClientEvent, ToastLevel},
    session::SessionState,
};

pub const NETWORK_FAILED_MESSAGE: &str = "network request failed";
pub const REQUEST_FAILED_MESSAGE: &str = "request failed";
pub const LOGIN_REQUIRED_MESSAGE: &str = "please log in first";
pub const SESSION_EXPIRED_MESSAGE: &str = "your session has expired, please log in again";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(value: Method) -> Self {
        match value {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized to JSON before sending.
    Json(Value),
    /// Sent as-is.
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub method: Method,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    /// Suppress the toast for application-level failures.
    pub quiet: bool,
}

impl CallOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self::with_method(Method::Post)
    }

    pub fn put() -> Self {
        Self::with_method(Method::Put)
    }

    pub fn delete() -> Self {
        Self::with_method(Method::Delete)
    }

    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Single exit point for backend calls.
///
/// Every call carries the JSON content type and, while logged in, the bearer
/// token. Responses of either envelope convention come back as one
/// [`ApiResponse`]; transport problems and unauthorized answers are turned into
/// failures instead of errors, so callers branch on one value.
pub struct ApiGateway {
    http: Client,
    base_url: String,
    convention: ResponseConvention,
    session: Arc<SessionState>,
    events: broadcast::Sender<ClientEvent>,
}

impl ApiGateway {
    pub fn new(
        base_url: impl Into<String>,
        convention: ResponseConvention,
        timeout: Duration,
        session: Arc<SessionState>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            convention,
            session,
            events,
        })
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub async fn get(&self, path: &str) -> ApiResponse {
        self.call(path, CallOptions::get()).await
    }

    pub async fn post(&self, path: &str, body: Value) -> ApiResponse {
        self.call(path, CallOptions::post().json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> ApiResponse {
        self.call(path, CallOptions::put().json(body)).await
    }

    pub async fn delete(&self, path: &str) -> ApiResponse {
        self.call(path, CallOptions::delete()).await
    }

    pub async fn call(&self, path: &str, options: CallOptions) -> ApiResponse {
        let method = options.method;
        let token = self.session.token().await;
        let url = self.endpoint(path);

        let headers = build_headers(&options.headers, token.as_deref());
        let mut request = self.http.request(method.into(), &url).headers(headers);
        match options.body {
            Some(RequestBody::Json(value)) => match serde_json::to_string(&value) {
                Ok(body) => request = request.body(body),
                Err(err) => {
                    warn!(method = method.as_str(), path, error = %err, "failed to serialize request body");
                    return self.transport_failure(format!("invalid request body: {err}"));
                }
            },
            Some(RequestBody::Text(body)) => request = request.body(body),
            None => {}
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(method = method.as_str(), path, error = %err, "request failed");
                return self.transport_failure(NETWORK_FAILED_MESSAGE);
            }
        };
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!(method = method.as_str(), path, status, error = %err, "failed to read response body");
                return self.transport_failure(NETWORK_FAILED_MESSAGE);
            }
        };

        let normalized = match self.convention.normalize(status, &body) {
            Ok(normalized) => normalized,
            Err(err) => {
                warn!(method = method.as_str(), path, status, error = %err, "malformed response");
                return self.transport_failure(NETWORK_FAILED_MESSAGE);
            }
        };

        let failure = match normalized {
            ApiResponse::Failure(failure) => failure,
            success => {
                debug!(method = method.as_str(), path, status, "request succeeded");
                return success;
            }
        };

        if failure.kind == FailureKind::Unauthorized {
            return self.handle_unauthorized(method, path, token.is_some()).await;
        }

        let message = if failure.message.trim().is_empty() {
            REQUEST_FAILED_MESSAGE.to_string()
        } else {
            failure.message
        };
        debug!(method = method.as_str(), path, status, code = ?failure.code, %message, "request rejected");
        if !options.quiet {
            self.toast(ToastLevel::Error, message.clone());
        }
        ApiResponse::Failure(ApiFailure::new(failure.kind, failure.code, message))
    }

    fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Clears the session before returning, so later calls never see the
    /// rejected token. Only the call that actually cleared a session announces
    /// its expiry; concurrent calls rejected with the same token stay silent.
    async fn handle_unauthorized(&self, method: Method, path: &str, had_session: bool) -> ApiResponse {
        let cleared = self.session.clear().await;

        let message = if had_session {
            SESSION_EXPIRED_MESSAGE
        } else {
            LOGIN_REQUIRED_MESSAGE
        };
        warn!(method = method.as_str(), path, had_session, cleared, "unauthorized response");
        if cleared || !had_session {
            self.toast(ToastLevel::Warning, message);
        }
        ApiResponse::Failure(ApiFailure::unauthorized(message))
    }

    fn transport_failure(&self, message: impl Into<String>) -> ApiResponse {
        let message = message.into();
        self.toast(ToastLevel::Error, NETWORK_FAILED_MESSAGE);
        ApiResponse::Failure(ApiFailure::transport(message))
    }

    fn toast(&self, level: ToastLevel, message: impl Into<String>) {
        let _ = self.events.send(ClientEvent::toast(level, message));
    }
}

fn build_headers(extra: &[(String, String)], token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in extra {
        if name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
            warn!("ignoring caller-supplied authorization header");
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "skipping invalid request header"),
        }
    }

    if let Some(token) = token {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("session token is not a valid header value"),
        }
    }

    headers
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
