//! Authenticated controller session.
//!
//! A [`Session`] logs in once and then keeps its token alive with
//! [`Session::refresh_loop`]. It is built fresh for every supervisor attempt
//! and moved into the attempt's token refresh task.

use std::sync::Arc;
use std::time::Duration;

use aci_core::{FabricError, Result};
use serde_json::json;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::payload;
use crate::transport::{HttpReply, HttpTransport};

/// Login endpoint.
pub const LOGIN_PATH: &str = "/api/aaaLogin.json";
/// Token refresh endpoint.
pub const REFRESH_PATH: &str = "/api/aaaRefresh.json";
/// Cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "APIC-cookie";

/// Controller login credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Login user name.
    pub username: String,
    /// Login password.
    pub password: String,
}

impl Credentials {
    /// Credentials for `username` / `password`.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Polling cadence of a refresh loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshTiming {
    /// How often the loop checks the age of the refreshed item.
    pub tick: Duration,
    /// Age at which a refresh is issued.
    pub threshold: Duration,
}

impl RefreshTiming {
    /// Timing with the given tick and threshold.
    pub const fn new(tick: Duration, threshold: Duration) -> Self {
        Self { tick, threshold }
    }

    /// Whether something last refreshed at `since` is due again.
    pub(crate) fn is_due(&self, since: Option<Instant>) -> bool {
        since.is_some_and(|at| at.elapsed() >= self.threshold)
    }

    pub(crate) fn ticker(&self) -> time::Interval {
        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

/// One authenticated session with the controller.
pub struct Session {
    http: Arc<dyn HttpTransport>,
    credentials: Credentials,
    token: String,
    issued_at: Option<Instant>,
    strict_refresh: bool,
}

impl Session {
    /// New, not yet authenticated session.
    ///
    /// With `strict_refresh` a refresh reply with a non-2xx status or an
    /// error payload is an authentication failure; otherwise it is logged
    /// and the token is treated as refreshed.
    pub fn new(
        http: Arc<dyn HttpTransport>,
        credentials: Credentials,
        strict_refresh: bool,
    ) -> Self {
        Self {
            http,
            credentials,
            token: String::new(),
            issued_at: None,
            strict_refresh,
        }
    }

    /// The current token; empty until [`login`](Self::login) succeeds.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the token was last issued or refreshed.
    pub const fn issued_at(&self) -> Option<Instant> {
        self.issued_at
    }

    /// Whether a login has succeeded.
    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    /// Log in with the session's credentials.
    pub async fn login(&mut self) -> Result<()> {
        info!(username = %self.credentials.username, "logging in");
        let body = json!({
            "aaaUser": {
                "attributes": {
                    "name": self.credentials.username,
                    "pwd": self.credentials.password,
                }
            }
        });
        let reply = self.http.post_json(LOGIN_PATH, &body).await?;
        let json = payload::parse(&reply.body);
        if let Some(text) = json.as_ref().and_then(payload::error_text) {
            return Err(FabricError::Authentication(text));
        }
        if reply.status != 200 {
            return Err(FabricError::Authentication(format!(
                "HTTP status code: {}",
                reply.status
            )));
        }
        let json =
            json.ok_or_else(|| FabricError::Authentication("malformed login reply".to_string()))?;

        let token = self
            .http
            .cookie(TOKEN_COOKIE)
            .or_else(|| payload::login_token(&json))
            .ok_or_else(|| FabricError::Authentication("no token in login reply".to_string()))?;

        self.token = token;
        self.issued_at = Some(Instant::now());
        info!("login successful");
        Ok(())
    }

    /// Refresh the token.
    pub async fn refresh(&mut self) -> Result<()> {
        debug!("refreshing login token");
        let reply = self.http.get(REFRESH_PATH, &[]).await?;
        if let Err(err) = check_refresh_reply(&reply) {
            if self.strict_refresh {
                return Err(err);
            }
            warn!(error = %err, "token refresh reply reported a problem, continuing");
        }

        let rotated = self.http.cookie(TOKEN_COOKIE).or_else(|| {
            payload::parse(&reply.body).and_then(|json| payload::login_token(&json))
        });
        if let Some(token) = rotated.filter(|t| *t != self.token) {
            debug!("token rotated by refresh");
            self.token = token;
        }
        self.issued_at = Some(Instant::now());
        info!("login token refreshed");
        Ok(())
    }

    /// Refresh the token whenever it reaches the timing threshold.
    ///
    /// Returns the first refresh error, or `Ok(())` once `cancel` fires.
    pub async fn refresh_loop(
        &mut self,
        timing: RefreshTiming,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut ticker = timing.ticker();
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            if !timing.is_due(self.issued_at) {
                continue;
            }
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = self.refresh() => result?,
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("credentials", &self.credentials)
            .field("authenticated", &self.is_authenticated())
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

fn check_refresh_reply(reply: &HttpReply) -> Result<()> {
    if let Some(text) = payload::parse(&reply.body).and_then(|p| payload::error_text(&p)) {
        return Err(FabricError::Authentication(text));
    }
    if !reply.is_success() {
        return Err(FabricError::Authentication(format!(
            "HTTP status code: {}",
            reply.status
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
