//! Transport capabilities consumed by the session machinery.
//!
//! The session, subscription and listener code only sees the traits in this
//! module. [`http::ReqwestTransport`] and [`websocket::TungsteniteDialer`]
//! are the production implementations; tests substitute in-memory fakes.
//!
//! A [`TransportFactory`] hands out a fresh [`Transports`] pair for every
//! session attempt so that cookie storage never outlives the attempt that
//! logged in.

pub mod http;
pub mod tls;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

use aci_core::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use http::ReqwestTransport;
pub use websocket::TungsteniteDialer;

/// Status and body of one HTTP exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpReply {
    /// Build a reply from a status and body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Request/response access to the controller's REST API.
///
/// Paths are absolute (`/api/...`). Every I/O failure maps to
/// [`FabricError::Transport`](aci_core::FabricError::Transport); a non-2xx
/// status is not an error at this layer.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST a JSON body.
    async fn post_json(&self, path: &str, body: &Value) -> Result<HttpReply>;

    /// GET with query parameters.
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<HttpReply>;

    /// Current value of a cookie set by the controller, if any.
    fn cookie(&self, name: &str) -> Option<String>;
}

/// Opens the controller's event stream for a login token.
#[async_trait]
pub trait StreamDialer: Send + Sync {
    /// Open a read-only stream bound to `token`.
    async fn open(&self, token: &str) -> Result<Box<dyn EventStream>>;
}

/// One open duplex message stream.
#[async_trait]
pub trait EventStream: Send {
    /// Read the next data message.
    ///
    /// Control frames are skipped. A close frame or the end of the stream is
    /// a transport error.
    async fn next_message(&mut self) -> Result<Vec<u8>>;

    /// Close the stream. Idempotent and best effort.
    async fn close(&mut self);
}

/// The transport pair used by one session attempt.
pub struct Transports {
    /// REST access, shared by the session and the subscription.
    pub http: Arc<dyn HttpTransport>,
    /// Event stream dialer.
    pub dialer: Box<dyn StreamDialer>,
}

impl std::fmt::Debug for Transports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transports").finish_non_exhaustive()
    }
}

/// Builds a fresh [`Transports`] pair per session attempt.
pub trait TransportFactory: Send + Sync {
    /// Build transports with empty cookie storage.
    fn build(&self) -> Result<Transports>;
}

/// Production factory for one controller host.
#[derive(Clone, Debug)]
pub struct ApicTransportFactory {
    host: String,
    http_timeout: Duration,
}

impl ApicTransportFactory {
    /// Factory for `host` (name or address, optionally with `:port`).
    pub fn new(host: impl Into<String>, http_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            http_timeout,
        }
    }

    /// REST base URL.
    pub fn base_url(&self) -> String {
        format!("https://{}", self.host)
    }

    /// Event stream URL prefix; the token is appended.
    pub fn socket_url(&self) -> String {
        format!("wss://{}/socket", self.host)
    }
}

impl TransportFactory for ApicTransportFactory {
    fn build(&self) -> Result<Transports> {
        let http = ReqwestTransport::new(&self.base_url(), self.http_timeout)?;
        let dialer = TungsteniteDialer::new(self.socket_url())?;
        Ok(Transports {
            http: Arc::new(http),
            dialer: Box::new(dialer),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
