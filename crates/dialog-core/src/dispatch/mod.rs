//! # Dispatch/Handler Chain
//!
//! ```text
//! TransportEvent ─► SipServer ─► TransactionLayer::admit
//!                                  ├─ New ───────► SessionHandler ─► SipHandler::handle_request
//!                                  ├─ New CANCEL ► TransactionLayer::handle_cancel
//!                                  ├─ StrayAck ──► SessionHandler ─► SipHandler::handle_ack
//!                                  └─ Matched ───► (absorbed by the transaction)
//! ```
//!
//! Every inbound message runs on its own task; serialization happens on the
//! transaction and session locks only.

pub mod call;
pub mod handler;
pub mod request;
pub mod server;
pub mod session_handler;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use siphon_sip_core::{generate_tag, Method, SipMessage, StatusCode};

use crate::errors::DialogError;
use crate::session::{Session, SessionManager};
use crate::transaction::{Transaction, TransactionKey, TransactionLayer};

pub use call::{Call, CallState};
pub use handler::SipHandler;
pub use request::ServerRequest;
pub use server::SipServer;
pub use session_handler::SessionHandler;

/// State shared by the dispatch stages and every [`ServerRequest`]
pub(crate) struct DispatchContext {
    pub layer: TransactionLayer,
    pub sessions: Arc<SessionManager>,
    /// Sessions of initial INVITEs not answered with a final response yet,
    /// by INVITE server transaction
    pub pending_invites: DashMap<TransactionKey, Arc<Session>>,
}

impl DispatchContext {
    pub fn new(layer: TransactionLayer, sessions: Arc<SessionManager>) -> Self {
        Self {
            layer,
            sessions,
            pending_invites: DashMap::new(),
        }
    }

    /// Local tag of the session an INVITE targeted by `cancel` was resolved to,
    /// if it is still waiting for its final response
    pub fn pending_tag(&self, cancel: &Transaction) -> Option<String> {
        let invite = cancel.key().with_method(Method::Invite);
        self.pending_invites
            .get(&invite)
            .map(|session| session.local_tag().to_string())
    }

    /// Send a final response the application did not send itself.
    ///
    /// The To tag is the one already sent for the request if any, else the
    /// request's own, else the session's local tag. For the request that created
    /// `session`, the session follows the response.
    pub fn answer(
        &self,
        transaction: &Arc<Transaction>,
        session: Option<&Arc<Session>>,
        initial: bool,
        status: StatusCode,
    ) {
        let tag = transaction
            .response_tag()
            .or_else(|| session.map(|s| s.local_tag().to_string()))
            .unwrap_or_else(generate_tag);
        let response = transaction.request().create_response(status).and_then(|mut response| {
            if response.to_tag().is_none() {
                response.core_mut().set_to_tag(&tag)?;
            }
            Ok(response)
        });
        let result = response
            .map_err(DialogError::from)
            .and_then(|response| self.layer.send_response(transaction, response));
        if let Err(e) = result {
            warn!(id = %transaction.key(), status = %status, error = %e, "Could not send response");
            return;
        }

        let Some(session) = session.filter(|_| initial) else {
            return;
        };
        self.pending_invites.remove(transaction.key());
        session.on_response_sent(status);
        if session.is_terminated() {
            self.sessions.remove_session(session);
        }
    }

    /// An INVITE was answered with 487 on behalf of a CANCEL: end its session
    pub fn cancelled(&self, invite: &Arc<Transaction>) {
        if let Some((_, session)) = self.pending_invites.remove(invite.key()) {
            session.on_response_sent(StatusCode::RequestTerminated);
            debug!(session = %session.key(), "Session cancelled");
            self.sessions.remove_session(&session);
        }
    }
}
