//! Event class subscription.
//!
//! [`Subscription::subscribe`] registers interest in one managed-object class
//! over REST; events then arrive on the attempt's event stream. The controller
//! expires subscriptions that are not refreshed, so
//! [`Subscription::refresh_loop`] keeps the ID alive.

use std::collections::BTreeMap;
use std::sync::Arc;

use aci_core::{FabricError, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::payload;
use crate::session::RefreshTiming;
use crate::transport::HttpTransport;

/// Subscription refresh endpoint.
pub const SUBSCRIPTION_REFRESH_PATH: &str = "/api/subscriptionRefresh.json";

const NO_ID: &str = "no subscription ID in reply";

/// One registered interest in a class of fabric events.
pub struct Subscription {
    http: Arc<dyn HttpTransport>,
    class: String,
    params: BTreeMap<String, String>,
    id: Option<String>,
    refreshed_at: Option<Instant>,
}

impl Subscription {
    /// Inactive subscription to `class` with extra query parameters
    /// (typically `page`, `page-size` and filters).
    pub fn new(
        http: Arc<dyn HttpTransport>,
        class: impl Into<String>,
        params: BTreeMap<String, String>,
    ) -> Self {
        Self {
            http,
            class: class.into(),
            params,
            id: None,
            refreshed_at: None,
        }
    }

    /// Server-assigned ID, present while the subscription is active.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Whether a subscribe call has succeeded and not been cleared.
    pub const fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// When the subscription was created or last refreshed.
    pub const fn refreshed_at(&self) -> Option<Instant> {
        self.refreshed_at
    }

    /// Request path of the class query.
    pub fn path(&self) -> String {
        format!("/api/class/{}.json", self.class)
    }

    fn query(&self) -> Vec<(String, String)> {
        std::iter::once(("subscription".to_string(), "yes".to_string()))
            .chain(self.params.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    /// Register the subscription.
    pub async fn subscribe(&mut self) -> Result<()> {
        info!(class = %self.class, "subscribing");
        let reply = self.http.get(&self.path(), &self.query()).await?;
        let Some(json) = payload::parse(&reply.body) else {
            debug!(status = reply.status, "subscribe reply is not JSON");
            return Err(FabricError::Subscription(NO_ID.to_string()));
        };
        if let Some(text) = payload::error_text(&json) {
            return Err(FabricError::Subscription(text));
        }
        let id = payload::subscription_id(&json)
            .ok_or_else(|| FabricError::Subscription(NO_ID.to_string()))?;

        info!(class = %self.class, subscription_id = %id, "subscribed");
        self.id = Some(id);
        self.refreshed_at = Some(Instant::now());
        Ok(())
    }

    /// Keep the subscription alive.
    pub async fn refresh_subscription(&mut self) -> Result<()> {
        let id = self
            .id
            .clone()
            .ok_or_else(|| FabricError::Subscription("no active subscription".to_string()))?;
        debug!(subscription_id = %id, "refreshing subscription");

        let query = [("id".to_string(), id.clone())];
        let reply = self.http.get(SUBSCRIPTION_REFRESH_PATH, &query).await?;
        match payload::parse(&reply.body) {
            Some(json) => {
                if let Some(text) = payload::error_text(&json) {
                    return Err(FabricError::Subscription(text));
                }
            }
            None => debug!(status = reply.status, "subscription refresh reply is not JSON"),
        }
        if !reply.is_success() {
            return Err(FabricError::Subscription(format!(
                "HTTP status code: {}",
                reply.status
            )));
        }

        self.refreshed_at = Some(Instant::now());
        info!(subscription_id = %id, "subscription refreshed");
        Ok(())
    }

    /// Refresh the subscription whenever it reaches the timing threshold.
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
            if !timing.is_due(self.refreshed_at) {
                continue;
            }
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = self.refresh_subscription() => result?,
            }
        }
    }

    /// Forget the subscription ID.
    pub fn clear(&mut self) {
        if let Some(id) = self.id.take() {
            debug!(subscription_id = %id, "subscription cleared");
        }
        self.refreshed_at = None;
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("class", &self.class)
            .field("params", &self.params)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
