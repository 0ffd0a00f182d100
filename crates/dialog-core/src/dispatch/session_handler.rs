//! Session resolution stage of the handler chain
//!
//! Sits between the transaction layer and the application's [`SipHandler`]:
//! resolves each new request to its session, enforces in-dialog CSeq ordering,
//! answers resolution failures itself and hands everything else on.
//!
//! | Failure                                   | Response |
//! |-------------------------------------------|----------|
//! | no application session / no session       | 481      |
//! | application session table full            | 503      |
//! | in-dialog CSeq lower than the last one    | 500      |
//! | handler error before a final response     | error's status code |
//! | request dropped before a final response   | 500      |
//!
//! Every response sent here reuses the To tag already sent for the request,
//! falling back to the session's local tag.
//!
//! ACK never gets a response: an ACK that resolves to no session is dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, error, warn};

use siphon_sip_core::{Method, Request, SipMessage, StatusCode};

use crate::dispatch::handler::SipHandler;
use crate::dispatch::request::{DropGuard, ServerRequest};
use crate::dispatch::DispatchContext;
use crate::session::Session;
use crate::transaction::Transaction;

/// Resolves requests to sessions and calls the next stage
pub struct SessionHandler {
    context: Arc<DispatchContext>,
    handler: Arc<dyn SipHandler>,
}

impl SessionHandler {
    pub(crate) fn new(context: Arc<DispatchContext>, handler: Arc<dyn SipHandler>) -> Self {
        Self { context, handler }
    }

    /// Dispatch a request that just created `transaction`
    pub async fn handle(&self, transaction: Arc<Transaction>, request: Request, source: SocketAddr) {
        let resolved = match self.context.sessions.resolve_session(&request, source) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(method = %request.method(), error = %e, "Session resolution failed");
                self.context.answer(&transaction, None, false, e.status_code());
                return;
            }
        };
        let session = resolved.session.clone();

        if resolved.created {
            if request.method() == &Method::Invite {
                self.context
                    .pending_invites
                    .insert(transaction.key().clone(), session.clone());
                if transaction.state().is_final() {
                    // CANCEL answered it before we got here
                    self.context.cancelled(&transaction);
                    return;
                }
            }
        } else {
            if let Err(e) = session.check_remote_cseq(&request, source) {
                warn!(session = %session.key(), error = %e, "Rejecting in-dialog request");
                self.context.answer(&transaction, Some(&session), false, e.status_code());
                return;
            }
            session.on_request(&request);
        }

        let drop_guard = Arc::new(DropGuard::default());
        let server_request = ServerRequest::new(
            request,
            source,
            resolved.created,
            transaction.clone(),
            session.clone(),
            resolved.app,
            self.context.clone(),
            resolved.guard,
            drop_guard.clone(),
        );

        let result = self.handler.handle_request(server_request).await;
        // From here on a request the handler kept answers for itself when dropped
        let dropped = drop_guard.handler_returned();
        match result {
            Err(e) => {
                if e.is_programming_error() {
                    error!(id = %transaction.key(), error = %e, "Handler misused the API");
                } else {
                    warn!(id = %transaction.key(), error = %e, "Handler failed");
                }
                if !transaction.state().is_final() {
                    self.context
                        .answer(&transaction, Some(&session), resolved.created, e.status_code());
                }
            }
            Ok(()) if dropped && !transaction.state().is_final() => {
                warn!(id = %transaction.key(), "Handler dropped the request without a final response");
                self.context.answer(
                    &transaction,
                    Some(&session),
                    resolved.created,
                    StatusCode::ServerInternalError,
                );
            }
            Ok(()) => {}
        }

        if session.is_terminated() {
            self.context.sessions.remove_session(&session);
        }
    }

    /// Dispatch an ACK that matched no transaction (ACK for a 2xx)
    pub async fn handle_ack(&self, request: Request, source: SocketAddr) {
        if request.to_tag().is_none() {
            debug!(call_id = ?request.call_id(), "Dropping ACK without To tag");
            return;
        }
        match self.context.sessions.resolve_session(&request, source) {
            Ok(resolved) => {
                let session: Arc<Session> = resolved.session.clone();
                self.handler.handle_ack(request, session).await;
            }
            Err(e) => debug!(call_id = ?request.call_id(), error = %e, "Dropping ACK"),
        }
    }
}
