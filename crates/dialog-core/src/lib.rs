//! # Siphon Dialog-Core
//!
//! RFC 3261 signaling core: transactions, dialogs (sessions), application
//! sessions and the handler chain that delivers resolved requests to
//! application code.
//!
//! ## Architecture Position
//!
//! ```text
//! application (SipHandler)
//!      ↓
//! dispatch     ← resolves sessions, answers 481/500/503 itself
//!      ↓
//! session      ← dialogs grouped under application sessions
//!      ↓
//! transaction  ← RFC 3261 §17 state machines and timers
//!      ↓
//! sip-transport (Network)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use siphon_dialog_core::prelude::*;
//! use siphon_sip_core::StatusCode;
//! use siphon_sip_transport::UdpTransport;
//!
//! struct Answer;
//!
//! #[async_trait]
//! impl SipHandler for Answer {
//!     async fn handle_request(&self, request: ServerRequest) -> DialogResult<()> {
//!         request.respond(StatusCode::Ok)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (transport, events) = UdpTransport::bind("0.0.0.0:5060".parse()?, None).await?;
//!     let server = SipServer::new(CoreConfig::default(), Arc::new(transport), events, Arc::new(Answer))?;
//!     server.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! The transaction table and the application session registry are `DashMap`s.
//! Each transaction, application session and session has its own lock; no
//! global lock exists, and no lock is held across I/O. Timers fire into the
//! owning transaction's lock, so a timer and a message for the same transaction
//! are always serialized.

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod session;
pub mod transaction;

pub use config::CoreConfig;
pub use dispatch::{Call, CallState, ServerRequest, SessionHandler, SipHandler, SipServer};
pub use errors::{DialogError, DialogResult};
pub use session::{
    ApplicationSession, ApplicationSessionListener, Session, SessionKey, SessionListener,
    SessionManager, SessionState,
};
pub use transaction::{
    Admission, CancelOutcome, ChannelListener, TimerSettings, TimerType, Transaction,
    TransactionEvent, TransactionKey, TransactionKind, TransactionLayer, TransactionListener,
    TransactionState,
};

/// Commonly used items
pub mod prelude {
    pub use crate::config::CoreConfig;
    pub use crate::dispatch::{Call, CallState, ServerRequest, SipHandler, SipServer};
    pub use crate::errors::{DialogError, DialogResult};
    pub use crate::session::{ApplicationSession, Session, SessionState};
    pub use crate::transaction::{
        TransactionEvent, TransactionKey, TransactionLayer, TransactionListener, TransactionState,
    };
}
