//! REST transport using `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use aci_core::{FabricError, Result};
use async_trait::async_trait;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use serde_json::Value;
use tracing::debug;

use super::{HttpReply, HttpTransport};

/// HTTP client backed by `reqwest` with its own cookie jar.
///
/// Certificates are not validated. Each instance starts with an empty jar,
/// so the controller's session cookie lives exactly as long as the transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base: Url,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    /// Create a transport for `base_url` (e.g. `https://apic1`) with a
    /// per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| FabricError::Transport(format!("invalid controller URL {base_url}: {e}")))?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .user_agent(concat!("aci-stream/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FabricError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base, jar })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| FabricError::Transport(format!("invalid request path {path}: {e}")))
    }

    async fn read(response: reqwest::Response) -> Result<HttpReply> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FabricError::Transport(format!("failed to read response body: {e}")))?;
        Ok(HttpReply { status, body })
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<HttpReply> {
        let url = self.url(path)?;
        debug!(%url, "POST");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| FabricError::Transport(format!("HTTP request failed: {e}")))?;
        Self::read(response).await
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<HttpReply> {
        let url = self.url(path)?;
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FabricError::Transport(format!("HTTP request failed: {e}")))?;
        Self::read(response).await
    }

    fn cookie(&self, name: &str) -> Option<String> {
        let scope = self.base.join("/api/").ok()?;
        let header = self.jar.cookies(&scope)?;
        let header = header.to_str().ok()?;
        find_cookie(header, name)
    }
}

/// Find `name` in a `Cookie` header value (`a=1; b=2`).
fn find_cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
