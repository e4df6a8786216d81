//! Event stream over `tokio-tungstenite`.

use std::sync::Arc;

use aci_core::{FabricError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::tls::insecure_client_config;
use super::{EventStream, StreamDialer};

/// Dials `<prefix><token>`, e.g. `wss://apic1/socket<token>`.
#[derive(Clone)]
pub struct TungsteniteDialer {
    prefix: String,
    tls: Arc<ClientConfig>,
}

impl TungsteniteDialer {
    /// Dialer for a URL prefix; the login token is appended verbatim.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        Ok(Self {
            prefix: prefix.into(),
            tls: insecure_client_config()?,
        })
    }
}

impl std::fmt::Debug for TungsteniteDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteDialer")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StreamDialer for TungsteniteDialer {
    async fn open(&self, token: &str) -> Result<Box<dyn EventStream>> {
        let url = format!("{}{token}", self.prefix);
        debug!(prefix = %self.prefix, "opening event stream");
        let connector = Connector::Rustls(Arc::clone(&self.tls));
        let (ws, _response) =
            tokio_tungstenite::connect_async_tls_with_config(url, None, false, Some(connector))
                .await
                .map_err(|e| FabricError::Transport(format!("WebSocket connect failed: {e}")))?;
        info!(prefix = %self.prefix, "event stream open");
        Ok(Box::new(TungsteniteStream {
            inner: ws,
            closed: false,
        }))
    }
}

/// An open controller WebSocket.
struct TungsteniteStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl EventStream for TungsteniteStream {
    async fn next_message(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().as_bytes().to_vec()),
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes.to_vec()),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    let reason = frame.map_or_else(
                        || "no reason given".to_string(),
                        |f| format!("{} {}", f.code, f.reason.as_str()),
                    );
                    return Err(FabricError::Transport(format!(
                        "stream closed by peer: {reason}"
                    )));
                }
                Some(Err(e)) => {
                    return Err(FabricError::Transport(format!("WebSocket read failed: {e}")));
                }
                None => {
                    self.closed = true;
                    return Err(FabricError::Transport("stream ended".to_string()));
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "error closing event stream");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
