//! Conversation store: bounded in-memory map of conversation id to session.
//!
//! Each session sits behind its own async mutex so requests for one
//! conversation are serialized while other conversations proceed. The map
//! itself is guarded by a short-lived std mutex that is never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::model::ConversationSession;
use crate::config::GatewayConfig;

/// Shared handle to one session. Lock it for the duration of a routing call.
pub type SessionHandle = Arc<tokio::sync::Mutex<ConversationSession>>;

struct Entry {
    session: SessionHandle,
    last_access: Instant,
}

impl Entry {
    /// The store holds one reference; any other means a caller is using it.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.session) > 1
    }
}

/// Bounded conversation cache with least-recently-used eviction and idle expiry.
pub struct ConversationStore {
    entries: Mutex<HashMap<String, Entry>>,
    max_sessions: usize,
    /// Zero disables idle expiry.
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(max_sessions: usize, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            ttl,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Arc<Self> {
        Self::new(config.max_sessions, config.session_ttl)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Map operations cannot leave it half-updated, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the session for `id`, creating it with `context` if absent.
    ///
    /// The boolean is true when this call created the session.
    pub fn get_or_create(&self, id: &str, context: Map<String, Value>) -> (SessionHandle, bool) {
        let now = Instant::now();
        let mut entries = self.lock();

        if let Some(entry) = entries.get_mut(id) {
            entry.last_access = now;
            return (Arc::clone(&entry.session), false);
        }

        if entries.len() >= self.max_sessions {
            evict_least_recent(&mut entries);
        }

        let session: SessionHandle =
            Arc::new(tokio::sync::Mutex::new(ConversationSession::new(id, context)));
        entries.insert(
            id.to_string(),
            Entry {
                session: Arc::clone(&session),
                last_access: now,
            },
        );
        debug!(conversation_id = %id, sessions = entries.len(), "Created conversation session");
        (session, true)
    }

    /// Look up an existing session without creating one.
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        let mut entries = self.lock();
        let entry = entries.get_mut(id)?;
        entry.last_access = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    /// Copy of a session's current state.
    pub async fn snapshot(&self, id: &str) -> Option<ConversationSession> {
        let handle = self.get(id)?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop sessions idle for longer than the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        if self.ttl.is_zero() {
            return 0;
        }
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.in_use() || now.duration_since(entry.last_access) <= self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, remaining = entries.len(), "Expired idle conversations");
        }
        removed
    }
}

/// Remove the least recently used session that no caller is holding.
fn evict_least_recent(entries: &mut HashMap<String, Entry>) {
    let victim = entries
        .iter()
        .filter(|(_, entry)| !entry.in_use())
        .min_by_key(|(_, entry)| entry.last_access)
        .map(|(id, _)| id.clone());

    match victim {
        Some(id) => {
            entries.remove(&id);
            debug!(conversation_id = %id, "Evicted least recently used conversation");
        }
        None => warn!(
            sessions = entries.len(),
            "Conversation store full and every session is in use"
        ),
    }
}

/// Spawn a background task that periodically expires idle sessions.
pub fn spawn_sweep_task(store: Arc<ConversationStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            store.evict_expired();
        }
    })
}
