//! Cookie sessions backed by Redis or process memory
//!
//! A [`Session`] is loaded when a request arrives, handed to the controller
//! through the request context, and written back once the response is built.
//! It carries the logged-in identity, the CSRF token of its forms, the
//! one-shot flash message and the input echoed back after a failed submission.

use anyhow::Result;
use async_trait::async_trait;
use common::cache::RedisPool;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, info};
use uuid::Uuid;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "hairymada_session";

/// Name of the hidden form field carrying the CSRF token
pub const CSRF_FIELD: &str = "csrf_token";

/// Severity of a flash message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
    Warning,
    Info,
}

impl FlashLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Error => "error",
            FlashLevel::Warning => "warning",
            FlashLevel::Info => "info",
        }
    }
}

/// A message shown on the next rendered page only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub message: String,
    pub level: FlashLevel,
}

/// Everything persisted for one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: Option<i64>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub flash: Option<Flash>,
    #[serde(default)]
    pub old_input: HashMap<String, String>,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

/// Storage for session payloads
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<SessionData>>;

    async fn save(&self, id: &str, data: &SessionData, ttl_seconds: u64) -> Result<()>;

    async fn destroy(&self, id: &str) -> Result<()>;

    /// Drop expired sessions, returning how many were removed
    async fn cleanup_expired_sessions(&self) -> Result<u64>;
}

fn session_key(id: &str) -> String {
    format!("session:{}", id)
}

/// Sessions stored as JSON in Redis with a TTL
#[derive(Clone)]
pub struct RedisSessionStore {
    redis_pool: RedisPool,
}

impl RedisSessionStore {
    /// Create a new Redis session store
    pub fn new(redis_pool: RedisPool) -> Self {
        Self { redis_pool }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        match self.redis_pool.get(&session_key(id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, id: &str, data: &SessionData, ttl_seconds: u64) -> Result<()> {
        let payload = serde_json::to_string(data)?;
        self.redis_pool
            .set_ex(&session_key(id), &payload, ttl_seconds)
            .await
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        info!("Deleting session: {}", id);
        self.redis_pool.delete(&session_key(id)).await?;
        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64> {
        // Keys carry a TTL and Redis expires them itself
        Ok(0)
    }
}

#[derive(Debug)]
struct MemoryEntry {
    data: SessionData,
    expires: Instant,
}

/// Sessions kept in process memory; used when no Redis is configured
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<tokio::sync::Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemorySessionStore {
    /// Create a new in-memory session store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|entry| entry.expires > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn sweep(entries: &mut HashMap<String, MemoryEntry>, now: Instant) -> u64 {
    let before = entries.len();
    entries.retain(|_, entry| entry.expires > now);
    (before - entries.len()) as u64
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get(id) {
            Some(entry) if entry.expires > now => return Ok(Some(entry.data.clone())),
            Some(_) => debug!("Session {} expired", id),
            None => return Ok(None),
        }

        entries.remove(id);
        Ok(None)
    }

    async fn save(&self, id: &str, data: &SessionData, ttl_seconds: u64) -> Result<()> {
        let mut entries = self.entries.lock().await;
        sweep(&mut entries, Instant::now());
        entries.insert(
            id.to_string(),
            MemoryEntry {
                data: data.clone(),
                expires: Instant::now() + Duration::from_secs(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.entries.lock().await.remove(id);
        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let removed = sweep(&mut entries, Instant::now());
        if removed > 0 {
            debug!("Removed {} expired sessions", removed);
        }
        Ok(removed)
    }
}

fn new_csrf_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// Compare without stopping at the first differing byte
fn tokens_match(expected: &str, submitted: &str) -> bool {
    expected.len() == submitted.len()
        && expected
            .bytes()
            .zip(submitted.bytes())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

#[derive(Debug)]
struct SessionState {
    data: SessionData,
    dirty: bool,
}

/// The session of the request being handled
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Load the session named by the cookie, or start an empty one
    pub async fn start(store: &dyn SessionStore, cookie: Option<&str>) -> Result<Self> {
        if let Some(id) = cookie.filter(|id| !id.is_empty()) {
            if let Some(data) = store.load(id).await? {
                return Ok(Self::with_data(id.to_string(), data, false));
            }
            debug!("Unknown session {}, starting a new one", id);
        }

        Ok(Self::with_data(
            Uuid::new_v4().to_string(),
            SessionData::default(),
            false,
        ))
    }

    fn with_data(id: String, data: SessionData, dirty: bool) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(SessionState { data, dirty })),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the current payload
    pub fn data(&self) -> SessionData {
        self.state.lock().data.clone()
    }

    fn update(&self, change: impl FnOnce(&mut SessionData)) {
        let mut state = self.state.lock();
        change(&mut state.data);
        state.dirty = true;
    }

    pub fn user_id(&self) -> Option<i64> {
        self.state.lock().data.user_id
    }

    /// Record the logged-in identity
    pub fn login(&self, user_id: i64, email: &str, name: &str) {
        self.update(|data| {
            data.user_id = Some(user_id);
            data.user_email = Some(email.to_string());
            data.user_name = Some(name.to_string());
        });
    }

    /// Forget the logged-in identity
    pub fn logout(&self) {
        self.update(|data| {
            data.user_id = None;
            data.user_email = None;
            data.user_name = None;
        });
    }

    pub fn flash(&self, message: impl Into<String>, level: FlashLevel) {
        let message = message.into();
        self.update(|data| data.flash = Some(Flash { message, level }));
    }

    /// Read and clear the flash message
    pub fn take_flash(&self) -> Option<Flash> {
        let mut state = self.state.lock();
        let flash = state.data.flash.take();
        if flash.is_some() {
            state.dirty = true;
        }
        flash
    }

    pub fn set_old_input(&self, input: HashMap<String, String>) {
        self.update(|data| data.old_input = input);
    }

    /// Read and clear the echoed form input
    pub fn take_old_input(&self) -> HashMap<String, String> {
        let mut state = self.state.lock();
        let input = std::mem::take(&mut state.data.old_input);
        if !input.is_empty() {
            state.dirty = true;
        }
        input
    }

    /// The CSRF token embedded in this session's forms, issued on first use
    pub fn csrf_token(&self) -> String {
        let mut state = self.state.lock();
        if let Some(token) = &state.data.csrf_token {
            return token.clone();
        }

        let token = new_csrf_token();
        state.data.csrf_token = Some(token.clone());
        state.dirty = true;
        token
    }

    /// Whether a submitted form token matches the one issued to this session
    pub fn verify_csrf_token(&self, submitted: &str) -> bool {
        match &self.state.lock().data.csrf_token {
            Some(expected) => tokens_match(expected, submitted),
            None => false,
        }
    }

    /// Write the payload back if anything changed during the request
    pub async fn persist(&self, store: &dyn SessionStore, ttl_seconds: u64) -> Result<bool> {
        let data = {
            let mut state = self.state.lock();
            if !state.dirty {
                return Ok(false);
            }
            state.dirty = false;
            state.data.clone()
        };

        store.save(&self.id, &data, ttl_seconds).await?;
        Ok(true)
    }
}
