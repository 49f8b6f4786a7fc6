//! Public types for the notify-realtime crate.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite;

/// Returns the current bearer credential, or `None` when the user is signed out.
///
/// Called on every connect attempt and every REST request; the crate never
/// caches the returned value.
pub type TokenSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Server-assigned notification identity.
pub type NotificationId = u64;

/// Delivery channel a notification was created for.
///
/// Unknown values from the server are preserved in [`NotificationKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    Email,
    Sms,
    Push,
    InApp,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Email => "email",
            NotificationKind::Sms => "sms",
            NotificationKind::Push => "push",
            NotificationKind::InApp => "in_app",
            NotificationKind::Other(s) => s,
        }
    }
}

impl From<String> for NotificationKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "email" => NotificationKind::Email,
            "sms" => NotificationKind::Sms,
            "push" => NotificationKind::Push,
            "in_app" | "in-app" => NotificationKind::InApp,
            _ => NotificationKind::Other(s),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Delivery status. `Pending` is what the store counts as unread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Delivered,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
        }
    }
}

/// A notification as delivered by the push channel or the REST list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: NotificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        self.status == NotificationStatus::Pending
    }
}

/// Push connection lifecycle. Owned by the session task; exactly one value at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of an asynchronous failure reported through [`Event::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// `connect()` was called while the token source returned `None`.
    NoCredential,
    /// The socket failed to open or closed abnormally.
    Transport,
    /// The retry ceiling was reached; push is now `failed` and polling has taken over.
    RetriesExhausted,
}

/// Events emitted by a [`NotificationClient`](crate::NotificationClient).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A notification not previously known to the store was ingested.
    Notification(Notification),
    /// The connection state changed (emitted on every transition, including
    /// repeated `Reconnecting` for each scheduled retry).
    StateChanged(ConnectionState),
    /// The unread count reported by the REST endpoint changed while polling.
    UnreadCount(u32),
    /// The server sent a `connection_status` frame.
    ServerStatus(String),
    /// An asynchronous failure.
    Error { kind: ErrorKind, message: String },
}

/// Errors returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("no credential available")]
    NoCredential,

    #[error("API error: status={status}, {message}")]
    Api { status: u16, message: String },

    #[error("push channel is not connected")]
    NotConnected,

    #[error("config error: {0}")]
    Config(String),

    #[error("notification session has shut down")]
    Closed,
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
