//! Process-wide directory of live sessions.
//!
//! Every session inserts itself when it opens and removes itself when its
//! actor exits, so [`SessionRegistry::list_sessions`] and
//! [`SessionRegistry::stop_all`] see exactly the sessions still running.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ SessionRegistry                      │
//! │  serial: AtomicU64                   │  (next key suffix)
//! │  sessions: SessionKey → Session      │  (live handles)
//! └──────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::session::Session;

/// Key under which a session is registered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey {
    /// Identifier of the owning service.
    pub service_id: String,
    /// Distinguishes sessions of the same service.
    pub serial: u64,
}

impl SessionKey {
    /// Create a key.
    pub fn new(service_id: impl Into<String>, serial: u64) -> Self {
        Self {
            service_id: service_id.into(),
            serial,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.service_id, self.serial)
    }
}

/// Synchronized mapping from [`SessionKey`] to live [`Session`] handles.
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    serial: AtomicU64,
    sessions: Mutex<BTreeMap<SessionKey, Session>>,
}

static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry sessions join unless told otherwise.
    pub fn global() -> SessionRegistry {
        GLOBAL.get_or_init(SessionRegistry::new).clone()
    }

    /// Hand out a key not used before in this registry.
    pub fn allocate_key(&self, service_id: &str) -> SessionKey {
        let serial = self.inner.serial.fetch_add(1, Ordering::Relaxed) + 1;
        SessionKey::new(service_id, serial)
    }

    /// Register a session under its key, replacing any stale entry.
    pub fn insert(&self, session: Session) {
        let key = session.key().clone();
        if self.sessions().insert(key.clone(), session).is_some() {
            tracing::warn!(session = %key, "replaced an existing registry entry");
        }
    }

    /// Unregister a session.
    pub fn remove(&self, key: &SessionKey) -> Option<Session> {
        self.sessions().remove(key)
    }

    /// Look up a live session.
    pub fn get(&self, key: &SessionKey) -> Option<Session> {
        self.sessions().get(key).cloned()
    }

    /// Keys of every live session, in key order.
    pub fn list_sessions(&self) -> Vec<SessionKey> {
        self.sessions().keys().cloned().collect()
    }

    /// Ask every live session to stop. Returns how many were asked.
    ///
    /// Sessions leave the registry once their actors exit; use
    /// [`stop_all_and_wait`](Self::stop_all_and_wait) to wait for that.
    pub fn stop_all(&self) -> usize {
        let sessions = self.snapshot();
        for session in &sessions {
            session.stop();
        }
        tracing::info!(count = sessions.len(), "stopping all sessions");
        sessions.len()
    }

    /// Stop every live session and wait until each has closed.
    pub async fn stop_all_and_wait(&self) -> usize {
        let sessions = self.snapshot();
        for session in &sessions {
            session.stop();
        }
        for session in &sessions {
            let reason = session.closed().await;
            tracing::debug!(session = %session.key(), %reason, "session stopped");
        }
        sessions.len()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    fn snapshot(&self) -> Vec<Session> {
        self.sessions().values().cloned().collect()
    }

    fn sessions(&self) -> MutexGuard<'_, BTreeMap<SessionKey, Session>> {
        // The map is never left half-updated, so a poisoned lock is usable.
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
