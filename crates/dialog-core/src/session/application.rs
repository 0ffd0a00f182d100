//! Application sessions
//!
//! An [`ApplicationSession`] groups the sessions (dialogs) belonging to one
//! application-level conversation and carries an attribute store shared by
//! them. It expires when it owns no session, nobody is using it and its idle
//! timeout has elapsed since the last access.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::session::dialog::{Session, SessionKey};

struct AppInner {
    last_accessed: Instant,
    timeout: Duration,
    sessions: HashMap<SessionKey, Arc<Session>>,
    attributes: HashMap<String, Value>,
    valid: bool,
    removed: bool,
}

/// A group of sessions with a shared lifetime and attribute store
pub struct ApplicationSession {
    id: String,
    created_at: DateTime<Utc>,
    in_use: AtomicUsize,
    inner: Mutex<AppInner>,
}

/// Marks an application session as in use while alive; in-use sessions are
/// never expired
pub struct InUseGuard {
    app: Arc<ApplicationSession>,
}

impl Drop for InUseGuard {
    fn drop(&mut self) {
        self.app.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for InUseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InUseGuard({})", self.app.id)
    }
}

impl ApplicationSession {
    pub(crate) fn new(id: String, timeout: Duration) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            in_use: AtomicUsize::new(0),
            inner: Mutex::new(AppInner {
                last_accessed: Instant::now(),
                timeout,
                sessions: HashMap::new(),
                attributes: HashMap::new(),
                valid: true,
                removed: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> Instant {
        self.inner.lock().last_accessed
    }

    /// Record an access, pushing expiry back by the timeout
    pub fn accessed(&self) {
        self.inner.lock().last_accessed = Instant::now();
    }

    pub fn timeout(&self) -> Duration {
        self.inner.lock().timeout
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.lock().timeout = timeout;
    }

    /// Whether [`ApplicationSession::invalidate`] has not been called
    pub fn is_valid(&self) -> bool {
        self.inner.lock().valid
    }

    /// Number of active users (requests being processed)
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Mark the session as in use until the guard is dropped
    pub fn acquire(self: &Arc<Self>) -> InUseGuard {
        self.in_use.fetch_add(1, Ordering::AcqRel);
        InUseGuard { app: self.clone() }
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.lock().sessions.values().cloned().collect()
    }

    pub fn session(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.inner.lock().sessions.get(key).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.inner.lock().attributes.get(name).cloned()
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner.lock().attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) -> Option<Value> {
        self.inner.lock().attributes.remove(name)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.inner.lock().attributes.keys().cloned().collect()
    }

    /// Terminate every session and make the application session expire at the
    /// next sweep it is not in use. Returns the sessions that were dropped.
    pub fn invalidate(&self) -> Vec<Arc<Session>> {
        let mut inner = self.inner.lock();
        if !inner.valid {
            return Vec::new();
        }
        debug!(app_id = %self.id, "Invalidating application session");
        inner.valid = false;
        inner.timeout = Duration::ZERO;
        inner.attributes.clear();
        let sessions: Vec<Arc<Session>> = inner.sessions.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.terminate();
        }
        sessions
    }

    /// Add a session; fails when the application session is gone
    pub(crate) fn add_session(&self, session: Arc<Session>) -> bool {
        let mut inner = self.inner.lock();
        if inner.removed || !inner.valid {
            return false;
        }
        inner.sessions.insert(session.key().clone(), session);
        true
    }

    pub(crate) fn remove_session(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.inner.lock().sessions.remove(key)
    }

    /// Find a session for an in-dialog request and mark the application session
    /// in use, atomically with respect to expiry
    pub(crate) fn enter(self: &Arc<Self>, key: &SessionKey) -> Option<(Arc<Session>, InUseGuard)> {
        let mut inner = self.inner.lock();
        if inner.removed {
            trace!(app_id = %self.id, "Application session already removed");
            return None;
        }
        let session = inner.sessions.get(key).cloned()?;
        inner.last_accessed = Instant::now();
        Some((session, self.acquire()))
    }

    /// Whether the application session may be removed at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        let inner = self.inner.lock();
        self.expirable(&inner, now)
    }

    fn expirable(&self, inner: &AppInner, now: Instant) -> bool {
        inner.sessions.is_empty()
            && self.in_use() == 0
            && now.saturating_duration_since(inner.last_accessed) >= inner.timeout
    }

    /// Re-check expiry under the lock and, if expired, mark the application
    /// session removed so concurrent lookups stop finding sessions in it
    pub(crate) fn try_expire(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        if inner.removed {
            return true;
        }
        if !self.expirable(&inner, now) {
            return false;
        }
        inner.removed = true;
        true
    }
}

impl fmt::Debug for ApplicationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationSession")
            .field("id", &self.id)
            .field("sessions", &self.session_count())
            .field("in_use", &self.in_use())
            .finish()
    }
}
