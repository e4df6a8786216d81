//! In-memory transports for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use aci_core::{FabricError, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::payload;
use crate::transport::{
    EventStream, HttpReply, HttpTransport, StreamDialer, TransportFactory, Transports,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One request seen by [`FakeHttp`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub at: Instant,
}

#[derive(Default)]
struct Script {
    once: VecDeque<Result<HttpReply>>,
    always: Option<Result<HttpReply>>,
}

/// Scripted REST transport keyed by path.
#[derive(Default)]
pub struct FakeHttp {
    scripts: Mutex<HashMap<String, Script>>,
    cookies: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reply to every request on `path`.
    pub fn reply(&self, path: &str, status: u16, body: &str) {
        lock(&self.scripts).entry(path.to_string()).or_default().always =
            Some(Ok(HttpReply::new(status, body)));
    }

    /// Reply to the next request on `path` only, ahead of any standing reply.
    pub fn reply_once(&self, path: &str, status: u16, body: &str) {
        lock(&self.scripts)
            .entry(path.to_string())
            .or_default()
            .once
            .push_back(Ok(HttpReply::new(status, body)));
    }

    /// Fail every request on `path`.
    pub fn fail(&self, path: &str, error: FabricError) {
        lock(&self.scripts).entry(path.to_string()).or_default().always = Some(Err(error));
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        let _ = lock(&self.cookies).insert(name.to_string(), value.to_string());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn count(&self, path: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.path == path).count()
    }

    fn respond(&self, path: &str, query: &[(String, String)], body: Option<Value>) -> Result<HttpReply> {
        lock(&self.requests).push(RecordedRequest {
            path: path.to_string(),
            query: query.to_vec(),
            body,
            at: Instant::now(),
        });
        let mut scripts = lock(&self.scripts);
        let Some(script) = scripts.get_mut(path) else {
            return Err(FabricError::Transport(format!("no reply scripted for {path}")));
        };
        if let Some(reply) = script.once.pop_front() {
            return reply;
        }
        script
            .always
            .clone()
            .unwrap_or_else(|| Err(FabricError::Transport(format!("no reply scripted for {path}"))))
    }
}

#[async_trait]
impl HttpTransport for FakeHttp {
    async fn post_json(&self, path: &str, body: &Value) -> Result<HttpReply> {
        self.respond(path, &[], Some(body.clone()))
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<HttpReply> {
        self.respond(path, query, None)
    }

    fn cookie(&self, name: &str) -> Option<String> {
        lock(&self.cookies).get(name).cloned()
    }
}

/// Test-side control of a [`FakeStream`].
#[derive(Clone)]
pub struct StreamHandle {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
    closed: Arc<AtomicBool>,
}

impl StreamHandle {
    pub fn push(&self, message: &str) {
        if let Some(tx) = lock(&self.tx).as_ref() {
            let _ = tx.send(message.as_bytes().to_vec());
        }
    }

    /// End the stream as if the peer went away.
    pub fn end(&self) {
        let _ = lock(&self.tx).take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Stream fed through a [`StreamHandle`].
pub struct FakeStream {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl EventStream for FakeStream {
    async fn next_message(&mut self) -> Result<Vec<u8>> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| FabricError::Transport("stream closed by peer".to_string()))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn fake_stream() -> (StreamHandle, Box<dyn EventStream>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let handle = StreamHandle {
        tx: Arc::new(Mutex::new(Some(tx))),
        closed: Arc::clone(&closed),
    };
    (handle, Box::new(FakeStream { rx, closed }))
}

/// One attempt's view of a shared [`FakeHttp`]: same script and request log,
/// but its own cookie jar. A successful login reply that carries a token sets
/// the token cookie in that jar, the way the controller's `Set-Cookie` does.
struct AttemptHttp {
    shared: Arc<FakeHttp>,
    jar: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl HttpTransport for AttemptHttp {
    async fn post_json(&self, path: &str, body: &Value) -> Result<HttpReply> {
        let reply = self.shared.post_json(path, body).await?;
        if path == crate::session::LOGIN_PATH && reply.is_success() {
            if let Some(token) = payload::parse(&reply.body).and_then(|j| payload::login_token(&j)) {
                let _ = lock(&self.jar).insert(crate::session::TOKEN_COOKIE.to_string(), token);
            }
        }
        Ok(reply)
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<HttpReply> {
        self.shared.get(path, query).await
    }

    fn cookie(&self, name: &str) -> Option<String> {
        lock(&self.jar).get(name).cloned()
    }
}

/// A whole fake controller: one scripted REST transport shared by every
/// attempt, plus a record of every stream opened.
#[derive(Clone, Default)]
pub struct FakeFabric {
    pub http: Arc<FakeHttp>,
    streams: Arc<Mutex<Vec<(String, StreamHandle)>>>,
    dial_error: Arc<Mutex<Option<FabricError>>>,
    builds: Arc<Mutex<usize>>,
}

impl FakeFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a controller that accepts login and subscription.
    pub fn healthy() -> Self {
        let fabric = Self::new();
        fabric.http.reply(
            crate::session::LOGIN_PATH,
            200,
            r#"{"imdata":[{"aaaLogin":{"attributes":{"token":"T1"}}}]}"#,
        );
        fabric.http.reply(crate::session::REFRESH_PATH, 200, r#"{"imdata":[]}"#);
        fabric
            .http
            .reply("/api/class/faultInst.json", 200, r#"{"subscriptionId":"42","imdata":[]}"#);
        fabric.http.reply(
            crate::subscription::SUBSCRIPTION_REFRESH_PATH,
            200,
            r#"{"imdata":[]}"#,
        );
        fabric
    }

    pub fn fail_dial(&self, error: Option<FabricError>) {
        *lock(&self.dial_error) = error;
    }

    /// Tokens and handles of every stream opened so far.
    pub fn streams(&self) -> Vec<(String, StreamHandle)> {
        lock(&self.streams).clone()
    }

    pub fn builds(&self) -> usize {
        *lock(&self.builds)
    }
}

impl TransportFactory for FakeFabric {
    fn build(&self) -> Result<Transports> {
        *lock(&self.builds) += 1;
        Ok(Transports {
            http: Arc::new(AttemptHttp {
                shared: Arc::clone(&self.http),
                jar: Mutex::default(),
            }),
            dialer: Box::new(FakeDialer {
                streams: Arc::clone(&self.streams),
                dial_error: Arc::clone(&self.dial_error),
            }),
        })
    }
}

struct FakeDialer {
    streams: Arc<Mutex<Vec<(String, StreamHandle)>>>,
    dial_error: Arc<Mutex<Option<FabricError>>>,
}

#[async_trait]
impl StreamDialer for FakeDialer {
    async fn open(&self, token: &str) -> Result<Box<dyn EventStream>> {
        if let Some(err) = lock(&self.dial_error).clone() {
            return Err(err);
        }
        let (handle, stream) = fake_stream();
        lock(&self.streams).push((token.to_string(), handle));
        Ok(stream)
    }
}
