//! Notifications published to whatever draws the client (toasts, header, page).

use serde::Serialize;

use crate::router::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Transient user-visible message.
    Toast { level: ToastLevel, message: String },
    /// Login state changed; navigation and header must be redrawn.
    SessionChanged {
        authenticated: bool,
        username: Option<String>,
    },
    ViewChanged { view: ViewState },
    Redirected { from: String, to: String },
}

impl ClientEvent {
    pub fn toast(level: ToastLevel, message: impl Into<String>) -> Self {
        Self::Toast {
            level,
            message: message.into(),
        }
    }
}
