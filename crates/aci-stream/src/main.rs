//! # aci-stream
//!
//! Logs in to a Cisco APIC controller, subscribes to one managed-object class
//! and prints every event of that class to stdout as JSON. Failures of any
//! kind restart the session after a cooldown; the process runs until Ctrl-C
//! or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use aci_client::{ApicTransportFactory, StdoutSink, Supervisor, SupervisorConfig};
use aci_settings::AciSettings;
use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// APIC event streamer.
#[derive(Parser, Debug)]
#[command(name = "aci-stream", version, about = "Stream APIC fabric events as JSON")]
struct Cli {
    /// Controller host name or address (overrides settings).
    #[arg(long)]
    apic: Option<String>,

    /// Login user name (overrides settings).
    #[arg(long)]
    usr: Option<String>,

    /// Login password (overrides settings).
    #[arg(long)]
    pwd: Option<String>,

    /// Managed-object class to subscribe to, e.g. `faultInst`.
    #[arg(long)]
    class: Option<String>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long)]
    http_timeout: Option<u64>,

    /// Settings file (defaults to `~/.aci-stream/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Log file (defaults to `<class>.log`).
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log to stderr only.
    #[arg(long)]
    no_log_file: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut AciSettings) {
        if let Some(ref host) = self.apic {
            settings.apic.host.clone_from(host);
        }
        if let Some(ref usr) = self.usr {
            settings.apic.username.clone_from(usr);
        }
        if let Some(ref pwd) = self.pwd {
            settings.apic.password.clone_from(pwd);
        }
        if let Some(ref class) = self.class {
            settings.subscription.class.clone_from(class);
        }
        if let Some(secs) = self.http_timeout {
            settings.apic.http_timeout_secs = secs;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(ref file) = self.log_file {
            settings.logging.file = Some(file.to_string_lossy().into_owned());
        }
        if self.no_log_file {
            settings.logging.to_file = false;
        }
    }
}

/// Load settings, apply CLI overrides and validate.
fn resolve_settings(args: &Cli) -> Result<AciSettings> {
    let mut settings = match args.settings {
        Some(ref path) => aci_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => aci_settings::load_settings().context("Failed to load settings")?,
    };
    args.apply(&mut settings);
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = resolve_settings(&args)?;

    let log_file = settings
        .logging
        .resolve_file(&settings.subscription.class);
    aci_core::logging::init_subscriber(&settings.logging.level, log_file.as_deref())
        .context("Failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %settings.apic.host,
        class = %settings.subscription.class,
        "aci-stream starting"
    );
    tracing::warn!(
        host = %settings.apic.host,
        "TLS certificate validation is disabled for all controller connections"
    );

    let factory = ApicTransportFactory::new(settings.apic.host.clone(), settings.apic.http_timeout());
    let supervisor = Supervisor::new(
        SupervisorConfig::from_settings(&settings),
        Arc::new(factory),
        Arc::new(StdoutSink),
    );

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(supervisor.run(shutdown.clone()));

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    shutdown.cancel();
    handle.await.context("Supervisor task failed")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
