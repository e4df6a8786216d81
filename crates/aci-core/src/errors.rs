//! Fabric error taxonomy.
//!
//! Every failure the session machinery can hit falls into one of four kinds.
//! Only [`FabricError::Decode`] is recoverable in place; the other kinds end
//! the loop that produced them and, through the supervisor, the whole session
//! attempt. The supervisor restarts on any kind, so the distinction exists for
//! diagnostics.

use serde::Serialize;

/// Errors produced while talking to the fabric controller.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FabricError {
    /// Network or I/O failure (HTTP request, WebSocket read, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The controller rejected the credentials or the token.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Subscribe or subscription refresh was rejected or malformed.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// A single streamed message was not valid JSON.
    #[error("decode error: {0}")]
    Decode(String),
}

impl FabricError {
    /// Short kind label for structured logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Authentication(_) => "authentication",
            Self::Subscription(_) => "subscription",
            Self::Decode(_) => "decode",
        }
    }

    /// The detail text without the kind prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Transport(s)
            | Self::Authentication(s)
            | Self::Subscription(s)
            | Self::Decode(s) => s,
        }
    }

    /// Whether this error ends the loop that produced it.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

impl From<serde_json::Error> for FabricError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Which step or background loop of a session attempt produced a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    /// `login()` during attempt setup.
    Login,
    /// Opening the event stream during attempt setup.
    StreamOpen,
    /// `subscribe()` during attempt setup.
    Subscribe,
    /// The credential refresh loop.
    TokenRefresh,
    /// The event listener.
    Listener,
    /// The subscription refresh loop.
    SubscriptionRefresh,
}

impl std::fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Login => "login",
            Self::StreamOpen => "stream_open",
            Self::Subscribe => "subscribe",
            Self::TokenRefresh => "token_refresh",
            Self::Listener => "listener",
            Self::SubscriptionRefresh => "subscription_refresh",
        };
        f.write_str(label)
    }
}

/// Result type for fabric operations.
pub type Result<T> = std::result::Result<T, FabricError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
