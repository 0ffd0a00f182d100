//! SIP sessions (dialogs, RFC 3261 §12)
//!
//! A [`Session`] is created for every initial request this server receives. For
//! dialog-creating methods it becomes a dialog once a provisional (>100) or 2xx
//! response is sent; for other methods it ends with the final response.
//!
//! On the calling side a session is built from the 2xx to an INVITE we sent
//! (see [`Session::from_response`]) and starts out Confirmed.
//!
//! ```text
//! Initial --1xx(>100)--> Early --2xx--> Confirmed --BYE--> Terminated
//!    |                     |
//!    +-------- >=300 or final for a non-dialog method ---> Terminated
//! ```

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use siphon_sip_core::{
    Address, CSeq, HeaderValue, Method, Request, Response, SipHeader, SipMessage, StatusCode,
    Uri,
};

use crate::errors::{DialogError, DialogResult};

const MAX_FORWARDS: &str = "70";

/// Dialog identifier: Call-ID plus local and remote tags
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

impl SessionKey {
    pub fn new(
        call_id: impl Into<String>,
        local_tag: impl Into<String>,
        remote_tag: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            local_tag: local_tag.into(),
            remote_tag: remote_tag.into(),
        }
    }

    /// Key of an in-dialog request received by this server: the To tag is ours
    pub fn for_request(request: &Request) -> Option<Self> {
        Some(Self::new(
            request.call_id()?,
            request.to_tag()?,
            request.from_tag().unwrap_or_default(),
        ))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};local={};remote={}", self.call_id, self.local_tag, self.remote_tag)
    }
}

/// Dialog state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Initial request received, nothing sent yet
    Initial,
    /// Provisional response with a tag sent
    Early,
    /// 2xx sent
    Confirmed,
    /// Ended by BYE, a failure response or invalidation
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Initial => write!(f, "Initial"),
            SessionState::Early => write!(f, "Early"),
            SessionState::Confirmed => write!(f, "Confirmed"),
            SessionState::Terminated => write!(f, "Terminated"),
        }
    }
}

struct SessionInner {
    state: SessionState,
    local_cseq: u32,
    remote_cseq: u32,
    route_set: Vec<Address>,
    remote_target: Uri,
    remote_addr: SocketAddr,
}

/// A dialog owned by an application session
pub struct Session {
    key: SessionKey,
    app_id: String,
    initial_method: Method,
    local_address: Address,
    remote_address: Address,
    created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

impl Session {
    /// Session for an initial request, answered under `local_tag`.
    ///
    /// The route set is the request's Record-Route list in order, the remote
    /// target its Contact (falling back to the From URI).
    pub fn from_request(
        app_id: impl Into<String>,
        local_tag: impl Into<String>,
        request: &Request,
        source: SocketAddr,
    ) -> DialogResult<Self> {
        let call_id = request
            .call_id()
            .ok_or_else(|| DialogError::protocol("request has no Call-ID"))?;
        let cseq = request
            .cseq()
            .ok_or_else(|| DialogError::protocol("request has no CSeq"))?;
        let remote_address = request
            .from_address()
            .cloned()
            .ok_or_else(|| DialogError::protocol("request has no From"))?;
        let local_tag = local_tag.into();
        let local_address = request
            .to_address()
            .cloned()
            .ok_or_else(|| DialogError::protocol("request has no To"))?
            .with_tag(local_tag.clone());

        let headers = request.headers();
        let route_set = headers
            .get_all(SipHeader::RecordRoute)
            .filter_map(HeaderValue::as_address)
            .cloned()
            .collect();
        let remote_target = headers
            .get(SipHeader::Contact)
            .and_then(HeaderValue::as_address)
            .map(|contact| contact.uri().clone())
            .unwrap_or_else(|| remote_address.uri().clone());
        let remote_tag = remote_address.tag().unwrap_or_default().to_string();

        Ok(Self {
            key: SessionKey::new(call_id, local_tag, remote_tag),
            app_id: app_id.into(),
            initial_method: request.method().clone(),
            local_address,
            remote_address,
            created_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Initial,
                local_cseq: 0,
                remote_cseq: cseq.seq,
                route_set,
                remote_target,
                remote_addr: source,
            }),
        })
    }

    /// Session established by `response` to `request`, which we sent (RFC 3261 §12.1.2).
    ///
    /// The local tag is the request's From tag; the response must carry a To
    /// tag. The route set is the response's Record-Route list in reverse, the
    /// remote target its Contact (falling back to the Request-URI).
    pub fn from_response(
        app_id: impl Into<String>,
        request: &Request,
        response: &Response,
        remote_addr: SocketAddr,
    ) -> DialogResult<Self> {
        let call_id = request
            .call_id()
            .ok_or_else(|| DialogError::protocol("request has no Call-ID"))?;
        let cseq = request
            .cseq()
            .ok_or_else(|| DialogError::protocol("request has no CSeq"))?;
        let local_address = request
            .from_address()
            .cloned()
            .ok_or_else(|| DialogError::protocol("request has no From"))?;
        let local_tag = local_address
            .tag()
            .ok_or_else(|| DialogError::protocol("request has no From tag"))?
            .to_string();
        let remote_address = response
            .to_address()
            .cloned()
            .ok_or_else(|| DialogError::protocol("response has no To"))?;
        let remote_tag = remote_address
            .tag()
            .ok_or_else(|| DialogError::protocol("response has no To tag"))?
            .to_string();

        let headers = response.headers();
        let mut route_set: Vec<Address> = headers
            .get_all(SipHeader::RecordRoute)
            .filter_map(HeaderValue::as_address)
            .cloned()
            .collect();
        route_set.reverse();
        let remote_target = headers
            .get(SipHeader::Contact)
            .and_then(HeaderValue::as_address)
            .map(|contact| contact.uri().clone())
            .unwrap_or_else(|| request.uri().clone());
        let state = if response.status().is_success() {
            SessionState::Confirmed
        } else {
            SessionState::Early
        };

        Ok(Self {
            key: SessionKey::new(call_id, local_tag, remote_tag),
            app_id: app_id.into(),
            initial_method: request.method().clone(),
            local_address,
            remote_address,
            created_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                state,
                local_cseq: cseq.seq,
                remote_cseq: 0,
                route_set,
                remote_target,
                remote_addr,
            }),
        })
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Id of the owning application session
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn call_id(&self) -> &str {
        &self.key.call_id
    }

    /// Our tag, which embeds the application id
    pub fn local_tag(&self) -> &str {
        &self.key.local_tag
    }

    pub fn remote_tag(&self) -> &str {
        &self.key.remote_tag
    }

    /// Method of the request that created the session
    pub fn initial_method(&self) -> &Method {
        &self.initial_method
    }

    /// Our To address, with the local tag
    pub fn local_address(&self) -> &Address {
        &self.local_address
    }

    /// Peer's From address, with the remote tag
    pub fn remote_address(&self) -> &Address {
        &self.remote_address
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == SessionState::Terminated
    }

    /// Last CSeq number used for a request we sent
    pub fn local_cseq(&self) -> u32 {
        self.inner.lock().local_cseq
    }

    /// Highest CSeq number received from the peer
    pub fn remote_cseq(&self) -> u32 {
        self.inner.lock().remote_cseq
    }

    pub fn route_set(&self) -> Vec<Address> {
        self.inner.lock().route_set.clone()
    }

    /// Where in-dialog requests are sent
    pub fn remote_target(&self) -> Uri {
        self.inner.lock().remote_target.clone()
    }

    /// Transport address the peer last sent from
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.lock().remote_addr
    }

    /// Update the state after a response was sent on this session
    pub fn on_response_sent(&self, status: StatusCode) {
        let mut inner = self.inner.lock();
        let code = status.as_u16();
        let next = match inner.state {
            SessionState::Terminated => return,
            state if !self.initial_method.creates_dialog() => {
                if status.is_final() {
                    SessionState::Terminated
                } else {
                    state
                }
            }
            SessionState::Initial | SessionState::Early if code > 100 && code < 200 => SessionState::Early,
            SessionState::Initial | SessionState::Early if status.is_success() => SessionState::Confirmed,
            SessionState::Initial | SessionState::Early if code >= 300 => SessionState::Terminated,
            state => state,
        };
        if next != inner.state {
            debug!(session = %self.key, "Session state: {} -> {}", inner.state, next);
            inner.state = next;
        }
    }

    /// Check and record the CSeq of an in-dialog request (RFC 3261 §12.2.2).
    ///
    /// A number lower than the last one seen is an error; ACK and CANCEL reuse
    /// the CSeq number of the request they refer to and are not checked. A target
    /// refresh (re-INVITE, UPDATE) with a Contact replaces the remote target.
    pub fn check_remote_cseq(&self, request: &Request, source: SocketAddr) -> DialogResult<()> {
        let method = request.method();
        if matches!(method, Method::Ack | Method::Cancel) {
            return Ok(());
        }
        let cseq = request
            .cseq()
            .ok_or_else(|| DialogError::protocol("request has no CSeq"))?;

        let mut inner = self.inner.lock();
        if cseq.seq < inner.remote_cseq {
            return Err(DialogError::CSeqOutOfOrder {
                call_id: self.key.call_id.clone(),
                received: cseq.seq,
                last: inner.remote_cseq,
            });
        }
        inner.remote_cseq = cseq.seq;
        inner.remote_addr = source;
        if matches!(method, Method::Invite | Method::Update) {
            if let Some(contact) = request.headers().get(SipHeader::Contact).and_then(HeaderValue::as_address) {
                inner.remote_target = contact.uri().clone();
            }
        }
        Ok(())
    }

    /// Update the state for an in-dialog request; BYE ends the dialog
    pub fn on_request(&self, request: &Request) {
        if request.method() == &Method::Bye {
            self.terminate();
        }
    }

    /// End the session
    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Terminated {
            debug!(session = %self.key, "Session state: {} -> Terminated", inner.state);
            inner.state = SessionState::Terminated;
        }
    }

    /// Build a request within this dialog (RFC 3261 §12.2.1.1).
    ///
    /// The local CSeq is incremented for every method but ACK. The request has
    /// no Via; the transaction layer adds one when it is sent.
    pub fn create_request(&self, method: Method) -> DialogResult<Request> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Early | SessionState::Confirmed => {}
            state => {
                return Err(DialogError::illegal_state(format!(
                    "cannot create {} in session {} (state {})",
                    method, self.key, state
                )))
            }
        }
        if method != Method::Ack {
            inner.local_cseq += 1;
        }

        let mut builder = Request::builder(method.clone(), inner.remote_target.clone());
        for route in &inner.route_set {
            builder = builder.header(SipHeader::Route, route.clone());
        }
        Ok(builder
            .header(SipHeader::MaxForwards, MAX_FORWARDS)
            .header(SipHeader::From, self.local_address.clone())
            .header(SipHeader::To, self.remote_address.clone())
            .header(SipHeader::CallId, self.key.call_id.as_str())
            .header(SipHeader::CSeq, CSeq::new(inner.local_cseq, method).to_string())
            .build())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("app_id", &self.app_id)
            .field("state", &self.state())
            .finish()
    }
}
