//! # aci-client
//!
//! Keeps an authenticated session with a Cisco APIC controller and consumes
//! its real-time event stream, recovering from any failure.
//!
//! - [`session`]: login and token refresh
//! - [`subscription`]: class subscription and keep-alive
//! - [`listener`]: reads the event stream and forwards well-formed JSON
//! - [`supervisor`]: runs attempts, detects the first failure, restarts
//! - [`transport`]: the HTTP and WebSocket capabilities the above consume
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary.

#![deny(unsafe_code)]

pub mod listener;
mod payload;
pub mod session;
pub mod subscription;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use listener::{ChannelSink, EventSink, ListenerStats, StdoutSink, listen};
pub use session::{Credentials, RefreshTiming, Session};
pub use subscription::Subscription;
pub use supervisor::{
    AttemptState, Failure, FailureReporter, Supervisor, SupervisorConfig, SupervisorStatus,
};
pub use transport::{
    ApicTransportFactory, EventStream, HttpReply, HttpTransport, StreamDialer, TransportFactory,
    Transports,
};
