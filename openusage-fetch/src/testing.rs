//! In-memory host doubles for tests.
//!
//! Available inside this crate's tests and, through the `testing` feature,
//! to downstream crates' tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use openusage_core::Clock;

use crate::context::ProbeContext;
use crate::error::{HttpError, KeychainError};
use crate::host::{FileSystem, HttpApi, HttpRequest, HttpResponse, KeychainApi, Method};

pub use crate::token::jwt::make_token;

// ============================================================================
// Clock
// ============================================================================

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Starts at `now_ms`.
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    /// Jumps to `now_ms`.
    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Moves forward by `ms`.
    pub fn advance(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Keychain
// ============================================================================

/// Keychain backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryKeychain {
    entries: Mutex<HashMap<(String, String), String>>,
    fail_writes: AtomicBool,
}

impl MemoryKeychain {
    /// Creates an empty keychain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry.
    pub fn insert(&self, service: &str, account: &str, secret: &str) {
        self.lock()
            .insert((service.to_string(), account.to_string()), secret.to_string());
    }

    /// Reads an entry regardless of account.
    pub fn value(&self, service: &str) -> Option<String> {
        self.lock()
            .iter()
            .find(|((s, _), _)| s == service)
            .map(|(_, v)| v.clone())
    }

    /// Makes every subsequent write fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), String>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl KeychainApi for MemoryKeychain {
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError> {
        Ok(self
            .lock()
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KeychainError::AccessDenied);
        }
        self.insert(service, account, secret);
        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError> {
        self.lock()
            .remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Debug, Clone)]
enum Reply {
    Response(HttpResponse),
    Timeout,
    Transport,
}

/// Scripted HTTP client that records every request.
///
/// Replies are queued per `(method, url)`; the last reply of a queue repeats.
/// Unmatched requests get a 404.
#[derive(Debug, Default)]
pub struct MockHttp {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttp {
    /// Creates a client with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn on(&self, method: Method, url: &str, status: u16, body: &str) {
        self.push(method, url, Reply::Response(HttpResponse::new(status, body)));
    }

    /// Queues a timeout.
    pub fn on_timeout(&self, method: Method, url: &str) {
        self.push(method, url, Reply::Timeout);
    }

    /// Queues a transport failure.
    pub fn on_transport_error(&self, method: Method, url: &str) {
        self.push(method, url, Reply::Transport);
    }

    fn push(&self, method: Method, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Requests sent to `url`.
    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests().into_iter().filter(|r| r.url == url).collect()
    }

    /// Number of requests sent to `url`.
    pub fn count(&self, url: &str) -> usize {
        self.requests_to(url).len()
    }
}

#[async_trait]
impl HttpApi for MockHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let key = (request.method, request.url.clone());
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request);

        let reply = {
            let mut routes = self
                .routes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Response(resp)) => Ok(resp),
            Some(Reply::Timeout) => Err(HttpError::Timeout),
            Some(Reply::Transport) => Err(HttpError::Transport("connection reset".into())),
            None => Ok(HttpResponse::new(404, "no mock route")),
        }
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// Creates a VS Code-style state database holding `items`.
///
/// # Panics
///
/// Panics if the database cannot be written.
pub fn create_item_db(path: &Path, items: &[(&str, &str)]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create db dir");
    }
    let conn = rusqlite::Connection::open(path).expect("open db");
    conn.execute_batch("CREATE TABLE IF NOT EXISTS ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB)")
        .expect("create ItemTable");
    for (key, value) in items {
        conn.execute(
            "INSERT INTO ItemTable (key, value) VALUES (?1, ?2)",
            [key, value],
        )
        .expect("insert item");
    }
}

// ============================================================================
// Test Host
// ============================================================================

/// A [`ProbeContext`] wired to in-memory doubles, with handles to each.
pub struct TestHost {
    /// The context to pass to code under test.
    pub ctx: ProbeContext,
    /// Scripted HTTP.
    pub http: Arc<MockHttp>,
    /// In-memory keychain.
    pub keychain: Arc<MemoryKeychain>,
    /// Manual clock.
    pub clock: Arc<ManualClock>,
}

impl TestHost {
    /// Home and data directories both live under `root`
    /// (`root/home`, `root/data`).
    pub fn new(root: &Path, now_ms: i64) -> Self {
        let http = Arc::new(MockHttp::new());
        let keychain = Arc::new(MemoryKeychain::new());
        let clock = Arc::new(ManualClock::new(now_ms));

        let ctx = ProbeContext {
            clock: clock.clone(),
            http: http.clone(),
            keychain: keychain.clone(),
            files: FileSystem::with_home(root.join("home")),
            sqlite: crate::host::SqliteClient::new(),
            tokens: Arc::default(),
            settings: crate::context::ProbeSettings {
                data_dir: root.join("data"),
                ..Default::default()
            },
        };

        Self {
            ctx,
            http,
            keychain,
            clock,
        }
    }
}
