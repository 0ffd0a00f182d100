//! # Dialog/Session Layer
//!
//! Maps requests onto long-lived [`Session`]s (dialogs) and groups sessions
//! into [`ApplicationSession`]s.
//!
//! ```text
//! SessionManager ── DashMap<app id, Arc<ApplicationSession>>
//!                          │  (own lock, in-use counter, attributes)
//!                          └── HashMap<SessionKey, Arc<Session>>
//!                                    (own lock: state, CSeq, route set)
//! ```
//!
//! The local tag of every session embeds its application id (see [`tag`]),
//! which is how an in-dialog request finds its way back to the application
//! session without any global index of dialogs.

pub mod application;
pub mod dialog;
pub mod listener;
pub mod manager;
pub mod tag;

pub use application::{ApplicationSession, InUseGuard};
pub use dialog::{Session, SessionKey, SessionState};
pub use listener::{ApplicationSessionListener, SessionListener};
pub use manager::{Resolved, SessionManager};
pub use tag::{extract_app_id, generate_app_id, generate_local_tag, APP_ID_DELIMITER, APP_ID_PARAM};
