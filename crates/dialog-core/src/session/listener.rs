use crate::session::application::ApplicationSession;
use crate::session::dialog::Session;

/// Lifecycle notifications for application sessions.
///
/// Called synchronously, in registration order, on the task that caused the
/// change. Implementations must not block.
pub trait ApplicationSessionListener: Send + Sync {
    fn on_created(&self, _app: &ApplicationSession) {}

    /// The expiry sweep found the application session idle past its timeout
    fn on_expired(&self, _app: &ApplicationSession) {}

    /// The application session left the registry
    fn on_destroyed(&self, _app: &ApplicationSession) {}
}

/// Lifecycle notifications for sessions (dialogs)
pub trait SessionListener: Send + Sync {
    fn on_created(&self, _session: &Session) {}

    /// The session terminated and left its application session
    fn on_destroyed(&self, _session: &Session) {}
}
