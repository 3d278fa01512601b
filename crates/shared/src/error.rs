use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a gateway call did not produce data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Backend unreachable, body unreadable or not a recognised envelope.
    Transport,
    /// Backend answered with a non-success envelope other than unauthorized.
    Application,
    /// Credentials missing or expired.
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub kind: FailureKind,
    /// Numeric code from the envelope or the HTTP status, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
}

impl ApiFailure {
    pub fn new(kind: FailureKind, code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, None, message)
    }

    pub fn application(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Application, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unauthorized, Some(401), message)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == FailureKind::Unauthorized
    }
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct ApiException {
    pub kind: FailureKind,
    pub code: Option<i64>,
    pub message: String,
}

impl From<ApiFailure> for ApiException {
    fn from(value: ApiFailure) -> Self {
        Self {
            kind: value.kind,
            code: value.code,
            message: value.message,
        }
    }
}

impl From<ApiException> for ApiFailure {
    fn from(value: ApiException) -> Self {
        Self {
            kind: value.kind,
            code: value.code,
            message: value.message,
        }
    }
}

/// Raised when a response body cannot be mapped onto either envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("response body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response body is not a JSON object")]
    NotAnObject,
    #[error("response envelope has neither a `success` flag nor a numeric `code`")]
    UnknownEnvelope,
    #[error("expected a `{expected}` field in the response envelope")]
    MissingField { expected: &'static str },
}
