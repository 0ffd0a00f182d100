//! Outgoing calls
//!
//! A [`Call`] is the calling side of an INVITE dialog. It starts empty;
//! [`Call::create_initial_request`] creates its application session and the
//! INVITE, whose From tag embeds the application id, so requests the callee
//! sends within the dialog resolve to the call's session like any other
//! in-dialog request. A call has exactly one initial transaction: creating or
//! sending a second initial request fails with an illegal-state error.
//!
//! ```text
//! Idle --create_initial_request--> Calling --2xx--> Established --BYE--> Terminated
//!                                     |
//!                                     +--3xx-6xx, timeout, transport error--> Failed
//! ```
//!
//! The 2xx establishes the session (remote tag, route set and target come from
//! it). The ACK for that 2xx is built with [`Call::create_ack`] and sent with
//! [`Call::send_ack`]; once sent it is re-sent for every retransmitted 2xx.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use siphon_sip_core::{
    generate_call_id, Address, CSeq, Method, Request, Response, SipHeader, SipMessage, Uri,
};

use crate::dispatch::DispatchContext;
use crate::errors::{DialogError, DialogResult};
use crate::session::{generate_local_tag, ApplicationSession, Session};
use crate::transaction::{TimerType, Transaction, TransactionKey, TransactionListener};

const MAX_FORWARDS: &str = "70";

/// Where an outgoing call stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    /// No initial request yet
    Idle,
    /// INVITE created or in progress
    Calling,
    /// 2xx received; the session exists
    Established,
    /// Final failure response, timeout or transport error
    Failed,
    /// Ended by BYE in either direction
    Terminated,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "Idle",
            CallState::Calling => "Calling",
            CallState::Established => "Established",
            CallState::Failed => "Failed",
            CallState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

struct CallInner {
    state: CallState,
    app: Option<Arc<ApplicationSession>>,
    destination: Option<SocketAddr>,
    transaction: Option<Arc<Transaction>>,
    session: Option<Arc<Session>>,
    /// ACK sent for the 2xx, re-sent on 2xx retransmissions
    ack: Option<Request>,
}

/// The calling side of an INVITE dialog
pub struct Call {
    context: Arc<DispatchContext>,
    inner: Mutex<CallInner>,
}

impl Call {
    pub(crate) fn new(context: Arc<DispatchContext>) -> Arc<Self> {
        Arc::new(Self {
            context,
            inner: Mutex::new(CallInner {
                state: CallState::Idle,
                app: None,
                destination: None,
                transaction: None,
                session: None,
                ack: None,
            }),
        })
    }

    pub fn state(&self) -> CallState {
        let inner = self.inner.lock();
        match &inner.session {
            Some(session) if session.is_terminated() => CallState::Terminated,
            _ => inner.state,
        }
    }

    pub fn application_session(&self) -> Option<Arc<ApplicationSession>> {
        self.inner.lock().app.clone()
    }

    /// The established session, once a 2xx was received
    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.lock().session.clone()
    }

    /// The initial INVITE transaction, once sent
    pub fn transaction(&self) -> Option<Arc<Transaction>> {
        self.inner.lock().transaction.clone()
    }

    /// Create the application session and the INVITE from `local` to `remote`.
    ///
    /// The request may be modified (body, extra headers) before it is passed to
    /// [`Call::send_initial`]. Fails if the call already has an initial request.
    pub fn create_initial_request(&self, local: Address, remote: Address) -> DialogResult<Request> {
        let mut inner = self.inner.lock();
        if inner.app.is_some() {
            return Err(DialogError::illegal_state("call already has an initial request"));
        }

        let local_addr = self.context.layer.transport().local_addr()?;
        let contact: Uri = format!("sip:{}", local_addr).parse()?;
        let app = self.context.sessions.create_application_session()?;
        let tag = generate_local_tag(app.id());
        let call_id = generate_call_id(Some(&local_addr.ip().to_string()));

        let mut to = remote.clone();
        to.params_mut().remove("tag");
        let request = Request::builder(Method::Invite, remote.uri().clone())
            .header(SipHeader::MaxForwards, MAX_FORWARDS)
            .header(SipHeader::From, local.with_tag(tag))
            .header(SipHeader::To, to)
            .header(SipHeader::CallId, call_id)
            .header(SipHeader::CSeq, CSeq::new(1, Method::Invite).to_string())
            .header(SipHeader::Contact, Address::new(contact))
            .build();

        debug!(app_id = %app.id(), call_id = ?request.call_id(), "Created outgoing call");
        inner.app = Some(app);
        inner.state = CallState::Calling;
        Ok(request)
    }

    /// Send the initial INVITE through a client transaction.
    ///
    /// Fails if no initial request was created or one was already sent.
    pub fn send_initial(self: &Arc<Self>, request: Request, destination: SocketAddr) -> DialogResult<Arc<Transaction>> {
        let mut inner = self.inner.lock();
        if inner.app.is_none() {
            return Err(DialogError::illegal_state("call has no initial request"));
        }
        if inner.transaction.is_some() {
            return Err(DialogError::illegal_state("call already sent its initial request"));
        }
        if request.method() != &Method::Invite {
            return Err(DialogError::illegal_state(format!(
                "initial request of a call must be INVITE, not {}",
                request.method()
            )));
        }

        // Responses wait on our lock until the transaction is recorded
        let listener: Arc<dyn TransactionListener> = Arc::new(CallListener {
            call: Arc::downgrade(self),
        });
        let transaction = self
            .context
            .layer
            .create_client_transaction(request, destination, Some(listener))?;
        inner.destination = Some(destination);
        inner.transaction = Some(transaction.clone());
        Ok(transaction)
    }

    /// ACK for the 2xx that established the call (RFC 3261 §13.2.2.4)
    pub fn create_ack(&self) -> DialogResult<Request> {
        let session = self.established("ACK")?;
        session.create_request(Method::Ack)
    }

    /// Send an ACK built by [`Call::create_ack`]
    pub fn send_ack(&self, ack: Request) -> DialogResult<()> {
        let destination = {
            let inner = self.inner.lock();
            inner
                .destination
                .ok_or_else(|| DialogError::illegal_state("call was never sent"))?
        };
        let sent = self.context.layer.send_ack(ack, destination)?;
        self.inner.lock().ack = Some(sent);
        Ok(())
    }

    /// BYE ending the established call
    pub fn create_bye(&self) -> DialogResult<Request> {
        let session = self.established("BYE")?;
        session.create_request(Method::Bye)
    }

    /// Send a BYE built by [`Call::create_bye`] and end the session
    pub fn send_bye(&self, bye: Request) -> DialogResult<Arc<Transaction>> {
        let session = self.established("BYE")?;
        let destination = self
            .inner
            .lock()
            .destination
            .ok_or_else(|| DialogError::illegal_state("call was never sent"))?;
        let transaction = self.context.layer.create_client_transaction(bye, destination, None)?;
        session.terminate();
        self.context.sessions.remove_session(&session);
        self.inner.lock().state = CallState::Terminated;
        debug!(session = %session.key(), "Call ended by BYE");
        Ok(transaction)
    }

    fn established(&self, what: &str) -> DialogResult<Arc<Session>> {
        let inner = self.inner.lock();
        match (&inner.session, inner.state) {
            (Some(session), CallState::Established) if !session.is_terminated() => Ok(session.clone()),
            (_, state) => Err(DialogError::illegal_state(format!(
                "cannot create {} for a call in state {}",
                what, state
            ))),
        }
    }

    fn on_response(&self, response: &Response) {
        let status = response.status();
        if status.is_provisional() {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.state != CallState::Calling && inner.session.is_none() {
            return;
        }
        if !status.is_success() {
            if inner.state == CallState::Calling {
                debug!(status = %status, "Call rejected");
                inner.state = CallState::Failed;
                self.release(&inner);
            }
            return;
        }

        if inner.session.is_some() {
            // Retransmitted 2xx: the ACK was lost
            if let Some((ack, destination)) = inner.ack.clone().zip(inner.destination) {
                if let Err(e) = self.context.layer.send_stateless(ack, destination) {
                    warn!(error = %e, "Could not re-send ACK");
                }
            }
            return;
        }

        let (Some(app), Some(transaction), Some(destination)) =
            (inner.app.clone(), inner.transaction.clone(), inner.destination)
        else {
            return;
        };
        let session = match Session::from_response(app.id(), transaction.request(), response, destination) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                warn!(error = %e, "Cannot establish call from 2xx");
                return;
            }
        };
        if let Err(e) = self.context.sessions.add_session(&app, session.clone()) {
            warn!(error = %e, "Cannot establish call");
            inner.state = CallState::Failed;
            return;
        }
        debug!(session = %session.key(), "Call established");
        inner.session = Some(session);
        inner.state = CallState::Established;
    }

    fn on_failure(&self, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.state == CallState::Calling {
            debug!(reason, "Call failed");
            inner.state = CallState::Failed;
            self.release(&inner);
        }
    }

    /// Give the application session of a failed call back to the registry
    fn release(&self, inner: &CallInner) {
        if let Some(app) = &inner.app {
            self.context.sessions.invalidate(app.id());
        }
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Call")
            .field("state", &inner.state)
            .field("app_id", &inner.app.as_ref().map(|app| app.id().to_string()))
            .field("session", &inner.session.as_ref().map(|s| s.key().clone()))
            .finish()
    }
}

/// Feeds the initial transaction's events into its call without keeping the call alive
struct CallListener {
    call: Weak<Call>,
}

impl TransactionListener for CallListener {
    fn on_response(&self, _key: &TransactionKey, response: &Response) {
        if let Some(call) = self.call.upgrade() {
            call.on_response(response);
        }
    }

    fn on_timeout(&self, _key: &TransactionKey, timer: TimerType) {
        if let Some(call) = self.call.upgrade() {
            call.on_failure(&format!("timer {} expired", timer));
        }
    }

    fn on_transport_error(&self, _key: &TransactionKey, error: &str) {
        if let Some(call) = self.call.upgrade() {
            call.on_failure(error);
        }
    }
}
