use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use siphon_sip_core::{Method, Request, Response, SipMessage, StatusCode};

use crate::dispatch::DispatchContext;
use crate::errors::DialogResult;
use crate::session::{ApplicationSession, InUseGuard, Session};
use crate::transaction::Transaction;

/// Decides who sends the 500 for a request dropped without a final response:
/// the handler chain if the handler has not returned yet, the drop otherwise
#[derive(Debug, Default)]
pub(crate) struct DropGuard {
    state: Mutex<DropState>,
}

#[derive(Debug, Default)]
struct DropState {
    handler_returned: bool,
    dropped: bool,
}

impl DropGuard {
    /// Record the drop; true when the dropping side has to answer
    fn dropped(&self) -> bool {
        let mut state = self.state.lock();
        state.dropped = true;
        state.handler_returned
    }

    /// Record the handler's return; true when the request is already gone
    pub(crate) fn handler_returned(&self) -> bool {
        let mut state = self.state.lock();
        state.handler_returned = true;
        state.dropped
    }
}

/// A request handed to the application: bound to its server transaction and
/// resolved to its session.
///
/// The application session stays in use, and so cannot expire, until the
/// `ServerRequest` is dropped. Dropping it before a final response was sent
/// answers the request with 500.
pub struct ServerRequest {
    request: Request,
    source: SocketAddr,
    initial: bool,
    transaction: Arc<Transaction>,
    session: Arc<Session>,
    app: Arc<ApplicationSession>,
    context: Arc<DispatchContext>,
    drop_guard: Arc<DropGuard>,
    _guard: InUseGuard,
}

impl ServerRequest {
    pub(crate) fn new(
        request: Request,
        source: SocketAddr,
        initial: bool,
        transaction: Arc<Transaction>,
        session: Arc<Session>,
        app: Arc<ApplicationSession>,
        context: Arc<DispatchContext>,
        guard: InUseGuard,
        drop_guard: Arc<DropGuard>,
    ) -> Self {
        Self {
            request,
            source,
            initial,
            transaction,
            session,
            app,
            context,
            drop_guard,
            _guard: guard,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Address the request came from
    pub fn source(&self) -> SocketAddr {
        self.source
    }

    /// Whether this request created its session
    pub fn is_initial(&self) -> bool {
        self.initial
    }

    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.transaction
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn application_session(&self) -> &Arc<ApplicationSession> {
        &self.app
    }

    /// Whether a final response has been sent
    pub fn is_committed(&self) -> bool {
        self.transaction.state().is_final()
    }

    /// Response to this request. Responses above 100 carry the session's local
    /// tag in To, which embeds the application id.
    pub fn create_response(&self, status: StatusCode) -> DialogResult<Response> {
        let mut response = self.request.create_response(status)?;
        if status.as_u16() > 100 && response.to_tag().is_none() {
            response.core_mut().set_to_tag(self.session.local_tag())?;
        }
        Ok(response)
    }

    /// Send a response through the server transaction and update the session.
    ///
    /// Fails with an illegal-state error if a final response was already sent.
    pub fn send_response(&self, response: Response) -> DialogResult<()> {
        let status = response.status();
        self.context.layer.send_response(&self.transaction, response)?;

        if self.initial {
            self.session.on_response_sent(status);
            if status.is_final() {
                self.context.pending_invites.remove(self.transaction.key());
            }
        }
        if self.session.is_terminated() {
            debug!(session = %self.session.key(), status = %status, "Session ended by response");
            self.context.sessions.remove_session(&self.session);
        }
        Ok(())
    }

    /// Create and send a response in one step
    pub fn respond(&self, status: StatusCode) -> DialogResult<()> {
        let response = self.create_response(status)?;
        self.send_response(response)
    }
}

impl Drop for ServerRequest {
    fn drop(&mut self) {
        if !self.drop_guard.dropped() || self.transaction.state().is_final() {
            return;
        }
        warn!(id = %self.transaction.key(), "Request dropped without a final response");
        self.context.answer(
            &self.transaction,
            Some(&self.session),
            self.initial,
            StatusCode::ServerInternalError,
        );
    }
}

impl fmt::Debug for ServerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRequest")
            .field("method", self.request.method())
            .field("source", &self.source)
            .field("transaction", self.transaction.key())
            .field("session", self.session.key())
            .finish()
    }
}
