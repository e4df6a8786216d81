//! Event listener: reads the stream, validates each message, forwards it.

use std::io::Write;
use std::sync::Arc;

use aci_core::Result;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::EventStream;

/// Destination for well-formed events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: &Value);
}

/// Writes each event to stdout as pretty-printed JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: &Value) {
        let rendered = match serde_json::to_string_pretty(event) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to render event");
                return;
            }
        };
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{rendered}") {
            warn!(error = %e, "failed to write event to stdout");
        }
    }
}

/// Forwards events to an unbounded channel. Delivery stops silently once the
/// receiver is gone.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Value>,
}

impl ChannelSink {
    /// Sink plus the receiving half.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &Value) {
        let _ = self.tx.send(event.clone());
    }
}

/// Counters for one listener run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Messages delivered to the sink.
    pub delivered: u64,
    /// Messages dropped because they were not JSON.
    pub malformed: u64,
}

/// Decode one stream message.
pub fn decode_event(bytes: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read `stream` until it fails or `cancel` fires.
///
/// Well-formed messages go to `sink` exactly once; malformed ones are logged
/// and skipped. The stream is closed before returning on every path. A read
/// error is returned as-is; cancellation returns the run's counters.
pub async fn listen(
    mut stream: Box<dyn EventStream>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) -> Result<ListenerStats> {
    let mut stats = ListenerStats::default();
    info!("event listener started");

    let outcome = loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break Ok(()),
            message = stream.next_message() => message,
        };
        let bytes = match message {
            Ok(bytes) => bytes,
            Err(err) => break Err(err),
        };
        match decode_event(&bytes) {
            Ok(event) => {
                sink.emit(&event);
                stats.delivered += 1;
            }
            Err(err) if !err.is_fatal() => {
                stats.malformed += 1;
                warn!(
                    error = %err.detail(),
                    payload = %String::from_utf8_lossy(&bytes),
                    "non-JSON message received"
                );
            }
            Err(err) => break Err(err),
        }
    };

    stream.close().await;
    debug!(
        delivered = stats.delivered,
        malformed = stats.malformed,
        "event listener stopped"
    );
    outcome.map(|()| stats)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
