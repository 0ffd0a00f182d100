//! Process-wide registry of application sessions
//!
//! [`SessionManager`] is the only place application sessions are created and
//! removed. The registry is a sharded `DashMap`; every application session has
//! its own lock, so requests for unrelated calls never contend.
//!
//! ## Resolution
//!
//! - **Initial request** (no To tag, not CANCEL): a new application session and a
//!   new session are created. The session's local tag embeds the application id.
//! - **In-dialog request**: the application id is taken from the `appid`
//!   Request-URI parameter, else from the To tag. The application session is
//!   looked up by id, then the session within it by (Call-ID, To tag, From tag).
//!
//! ## Expiry
//!
//! [`SessionManager::sweep`] removes application sessions that own no session,
//! are not in use and have been idle past their timeout. The check is repeated
//! under the application session's lock at removal time, so a request that
//! resolves it concurrently either keeps it alive or finds it gone.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use siphon_infra_common::{ListenerId, ListenerRegistry};
use siphon_sip_core::Request;

use crate::config::CoreConfig;
use crate::errors::{DialogError, DialogResult};
use crate::session::application::{ApplicationSession, InUseGuard};
use crate::session::dialog::{Session, SessionKey};
use crate::session::listener::{ApplicationSessionListener, SessionListener};
use crate::session::tag::{generate_app_id, generate_local_tag, request_app_id};

/// A request resolved to its session
#[derive(Debug)]
pub struct Resolved {
    pub app: Arc<ApplicationSession>,
    pub session: Arc<Session>,
    /// Whether the session was created for this request
    pub created: bool,
    /// Keeps the application session from expiring while the request is processed
    pub guard: InUseGuard,
}

/// Registry of application sessions
pub struct SessionManager {
    apps: DashMap<String, Arc<ApplicationSession>>,
    max_application_sessions: usize,
    default_timeout: Duration,
    app_listeners: ListenerRegistry<dyn ApplicationSessionListener>,
    session_listeners: ListenerRegistry<dyn SessionListener>,
}

impl SessionManager {
    pub fn new(max_application_sessions: usize, default_timeout: Duration) -> Self {
        Self {
            apps: DashMap::new(),
            max_application_sessions,
            default_timeout,
            app_listeners: ListenerRegistry::new(),
            session_listeners: ListenerRegistry::new(),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(
            config.max_application_sessions,
            config.application_session_timeout(),
        )
    }

    pub fn add_application_listener(&self, listener: Arc<dyn ApplicationSessionListener>) -> ListenerId {
        self.app_listeners.add(listener)
    }

    pub fn remove_application_listener(&self, id: ListenerId) -> bool {
        self.app_listeners.remove(id)
    }

    pub fn add_session_listener(&self, listener: Arc<dyn SessionListener>) -> ListenerId {
        self.session_listeners.add(listener)
    }

    pub fn remove_session_listener(&self, id: ListenerId) -> bool {
        self.session_listeners.remove(id)
    }

    /// Number of live application sessions
    pub fn count(&self) -> usize {
        self.apps.len()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ApplicationSession>> {
        self.apps.get(id).map(|entry| entry.value().clone())
    }

    /// Create and register an empty application session
    pub fn create_application_session(&self) -> DialogResult<Arc<ApplicationSession>> {
        if self.apps.len() >= self.max_application_sessions {
            warn!(limit = self.max_application_sessions, "Application session table full");
            return Err(DialogError::ResourceExhausted {
                resource: "application sessions".to_string(),
                limit: self.max_application_sessions,
            });
        }
        let app = Arc::new(ApplicationSession::new(generate_app_id(), self.default_timeout));
        self.apps.insert(app.id().to_string(), app.clone());
        debug!(app_id = %app.id(), "Created application session");
        self.app_listeners.notify(|l| l.on_created(&app));
        Ok(app)
    }

    /// Resolve a request to its session, creating one for an initial request.
    ///
    /// Fails with [`DialogError::SessionNotFound`] when an in-dialog request
    /// names no application session, an unknown one, or no session within it.
    pub fn resolve_session(&self, request: &Request, source: SocketAddr) -> DialogResult<Resolved> {
        if request.is_initial() {
            return self.create_session(request, source);
        }

        let app_id = request_app_id(request)
            .ok_or_else(|| DialogError::session_not_found("no application session identifier"))?;
        let app = self
            .get(app_id)
            .ok_or_else(|| DialogError::session_not_found(format!("application session {}", app_id)))?;
        let key = SessionKey::for_request(request)
            .ok_or_else(|| DialogError::session_not_found(format!("no dialog key in application session {}", app_id)))?;
        let (session, guard) = app
            .enter(&key)
            .ok_or_else(|| DialogError::session_not_found(format!("session {}", key)))?;

        Ok(Resolved {
            app,
            session,
            created: false,
            guard,
        })
    }

    fn create_session(&self, request: &Request, source: SocketAddr) -> DialogResult<Resolved> {
        let app = self.create_application_session()?;
        let tag = generate_local_tag(app.id());
        let session = match Session::from_request(app.id(), tag, request, source) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.discard(&app);
                return Err(e);
            }
        };
        let guard = app.acquire();
        if !app.add_session(session.clone()) {
            return Err(DialogError::internal(format!(
                "application session {} vanished during creation",
                app.id()
            )));
        }
        debug!(app_id = %app.id(), session = %session.key(), "Created session");
        self.session_listeners.notify(|l| l.on_created(&session));
        Ok(Resolved {
            app,
            session,
            created: true,
            guard,
        })
    }

    fn discard(&self, app: &Arc<ApplicationSession>) {
        if self.apps.remove(app.id()).is_some() {
            self.app_listeners.notify(|l| l.on_destroyed(app));
        }
    }

    /// Attach a session created outside request resolution (the caller side of
    /// a call) to its application session
    pub fn add_session(&self, app: &Arc<ApplicationSession>, session: Arc<Session>) -> DialogResult<()> {
        if !app.add_session(session.clone()) {
            return Err(DialogError::illegal_state(format!(
                "application session {} is no longer valid",
                app.id()
            )));
        }
        app.accessed();
        debug!(app_id = %app.id(), session = %session.key(), "Added session");
        self.session_listeners.notify(|l| l.on_created(&session));
        Ok(())
    }

    /// Record an access to the application session owning `session`
    pub fn accessed(&self, session: &Session) {
        if let Some(app) = self.get(session.app_id()) {
            app.accessed();
        }
    }

    /// Drop a session from its application session
    pub fn remove_session(&self, session: &Session) {
        let Some(app) = self.get(session.app_id()) else {
            return;
        };
        if let Some(removed) = app.remove_session(session.key()) {
            debug!(app_id = %app.id(), session = %removed.key(), "Session removed");
            self.session_listeners.notify(|l| l.on_destroyed(&removed));
        }
    }

    /// Invalidate an application session, dropping its sessions. It leaves the
    /// registry now if unused, otherwise at the next sweep.
    pub fn invalidate(&self, id: &str) -> bool {
        let Some(app) = self.get(id) else {
            return false;
        };
        for session in app.invalidate() {
            self.session_listeners.notify(|l| l.on_destroyed(&session));
        }
        if let Some((_, app)) = self.apps.remove_if(id, |_, app| app.try_expire(Instant::now())) {
            self.app_listeners.notify(|l| l.on_destroyed(&app));
        }
        true
    }

    /// Remove every expired application session; returns how many were removed
    pub fn sweep(&self, now: Instant) -> usize {
        let ids: Vec<String> = self.apps.iter().map(|entry| entry.key().clone()).collect();
        let mut removed = 0;
        for id in ids {
            if let Some((_, app)) = self.apps.remove_if(&id, |_, app| app.try_expire(now)) {
                debug!(app_id = %id, "Application session expired");
                self.app_listeners.notify(|l| l.on_expired(&app));
                self.app_listeners.notify(|l| l.on_destroyed(&app));
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, remaining = self.apps.len(), "Application session sweep");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use siphon_sip_core::{Method, SipHeader, SipMessage, Via};

    use crate::session::tag::extract_app_id;

    fn source() -> SocketAddr {
        "192.0.2.20:5060".parse().unwrap()
    }

    fn request(method: Method, uri: &str, to: &str, cseq: u32) -> Request {
        Request::builder(method.clone(), uri.parse().unwrap())
            .header(SipHeader::Via, Via::new("UDP", "client.example.com", None, "z9hG4bKres1"))
            .raw_header(SipHeader::From, "<sip:alice@example.com>;tag=remote1")
            .unwrap()
            .raw_header(SipHeader::To, to)
            .unwrap()
            .header(SipHeader::CallId, "resolve-call@example.com")
            .header(SipHeader::CSeq, format!("{} {}", cseq, method))
            .build()
    }

    #[derive(Default)]
    struct Counts {
        created: AtomicUsize,
        expired: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl ApplicationSessionListener for Counts {
        fn on_created(&self, _app: &ApplicationSession) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        fn on_expired(&self, _app: &ApplicationSession) {
            self.expired.fetch_add(1, Ordering::SeqCst);
        }
        fn on_destroyed(&self, _app: &ApplicationSession) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_initial_then_in_dialog_resolution() {
        let manager = SessionManager::new(10, Duration::from_secs(60));
        let invite = request(Method::Invite, "sip:bob@example.com", "<sip:bob@example.com>", 1);
        let first = manager.resolve_session(&invite, source()).unwrap();
        assert!(first.created);
        assert_eq!(extract_app_id(first.session.local_tag()), first.app.id());
        drop(first.guard);

        let to = format!("<sip:bob@example.com>;tag={}", first.session.local_tag());
        let bye = request(Method::Bye, "sip:bob@example.com", &to, 2);
        let second = manager.resolve_session(&bye, source()).unwrap();
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.session, &second.session));
        assert_eq!(second.app.in_use(), 1);
    }

    #[tokio::test]
    async fn test_unknown_application_session() {
        let manager = SessionManager::new(10, Duration::from_secs(60));
        let bye = request(Method::Bye, "sip:bob@example.com", "<sip:bob@example.com>;tag=nothere-1", 2);
        let err = manager.resolve_session(&bye, source()).unwrap_err();
        assert!(matches!(err, DialogError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let manager = SessionManager::new(1, Duration::from_secs(60));
        manager.create_application_session().unwrap();
        let err = manager.create_application_session().unwrap_err();
        assert!(matches!(err, DialogError::ResourceExhausted { limit: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let manager = SessionManager::new(10, Duration::from_secs(30));
        let counts = Arc::new(Counts::default());
        manager.add_application_listener(counts.clone());

        let idle = manager.create_application_session().unwrap();
        let invite = request(Method::Invite, "sip:bob@example.com", "<sip:bob@example.com>", 1);
        let busy = manager.resolve_session(&invite, source()).unwrap();
        drop(busy.guard);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(manager.sweep(Instant::now()), 1);
        assert!(manager.get(idle.id()).is_none());
        // Still owns a session
        assert!(manager.get(busy.app.id()).is_some());

        manager.remove_session(&busy.session);
        assert_eq!(manager.sweep(Instant::now()), 1);
        assert_eq!(manager.count(), 0);
        assert_eq!(counts.created.load(Ordering::SeqCst), 2);
        assert_eq!(counts.expired.load(Ordering::SeqCst), 2);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_removes_unused_application_session() {
        let manager = SessionManager::new(10, Duration::from_secs(300));
        let invite = request(Method::Invite, "sip:bob@example.com", "<sip:bob@example.com>", 1);
        let resolved = manager.resolve_session(&invite, source()).unwrap();
        let id = resolved.app.id().to_string();
        let session = resolved.session.clone();
        drop(resolved);

        assert!(manager.invalidate(&id));
        assert!(session.is_terminated());
        assert!(manager.get(&id).is_none());
        assert!(!manager.invalidate(&id));
    }

    #[tokio::test]
    async fn test_explicit_app_id_parameter() {
        let manager = SessionManager::new(10, Duration::from_secs(60));
        let invite = request(Method::Invite, "sip:bob@example.com", "<sip:bob@example.com>", 1);
        let resolved = manager.resolve_session(&invite, source()).unwrap();

        let uri = format!("sip:bob@example.com;appid={}", resolved.app.id());
        let to = format!("<sip:bob@example.com>;tag={}", resolved.session.local_tag());
        let info = request(Method::Info, &uri, &to, 2);
        let again = manager.resolve_session(&info, source()).unwrap();
        assert!(Arc::ptr_eq(&resolved.app, &again.app));
        assert!(info.to_tag().is_some());
    }
}
