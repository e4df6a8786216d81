//! # aci-core
//!
//! Shared vocabulary for the ACI event streamer crates:
//!
//! - **Errors**: [`FabricError`], the taxonomy every session loop reports with
//! - **Failure origins**: [`FailureOrigin`], which step or loop of a session
//!   attempt produced a failure
//! - **Logging**: [`logging::init_subscriber`] for the binary and
//!   [`logging::capture_logs`] for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;

pub use errors::{FabricError, FailureOrigin, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
