//! # SIP Transaction Layer
//!
//! Implements the four RFC 3261 §17 transaction state machines (client and
//! server, INVITE and non-INVITE) on top of a shared timer wheel.
//!
//! ## Structure
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!  inbound → │ TransactionLayer (DashMap<Key, Arc<Tx>>) │ → TransactionListener
//!            └──────┬──────────────────────┬────────────┘
//!                   │ per-transaction lock │
//!            ┌──────▼──────┐        ┌──────▼──────┐
//!            │ client.rs   │        │ server.rs   │
//!            └──────┬──────┘        └──────┬──────┘
//!                   │ arm/disarm           │
//!            ┌──────▼──────────────────────▼──────┐
//!            │ TimerWheel (driver task)            │
//!            └─────────────────────────────────────┘
//! ```
//!
//! Each [`Transaction`] owns a `parking_lot::Mutex` around its mutable state.
//! Messages, timer expiries and transport failures all take that lock, compute
//! the transition, arm or disarm timers, and collect the resulting sends and
//! listener events. The lock is released before anything is sent or reported,
//! so no transaction is ever locked across I/O.

pub mod client;
pub mod event;
pub mod key;
pub mod manager;
pub mod server;
pub mod state;
pub mod timer;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use siphon_sip_core::{Message, Method, Request, Response, SipMessage};

use crate::errors::DialogResult;

pub use event::{ChannelListener, TransactionEvent, TransactionListener};
pub use key::TransactionKey;
pub use manager::{Admission, CancelOutcome, TransactionLayer};
pub use state::{TransactionKind, TransactionState};
pub use timer::{TimerSettings, TimerType};

use timer::{TimerId, TimerWheel};

/// What the timer wheel stores: which timer of which transaction
#[derive(Debug, Clone)]
pub(crate) struct TimerEntry {
    pub key: TransactionKey,
    pub timer: TimerType,
}

/// Timer access handed to the state machines while they hold their lock
pub(crate) struct TimerContext<'a> {
    pub wheel: &'a TimerWheel<TimerEntry>,
    pub settings: &'a TimerSettings,
}

/// Work left to do once the transaction lock is released
#[derive(Debug, Default)]
pub(crate) struct Actions {
    pub sends: Vec<Message>,
    pub events: Vec<TransactionEvent>,
    pub terminated: bool,
}

pub(crate) struct Inner {
    pub state: TransactionState,
    /// Client: responses received. Server: responses sent.
    pub responses: Vec<Response>,
    /// Server: the response to retransmit
    pub last_response: Option<Response>,
    /// Client INVITE: ACK generated for a non-2xx final response
    pub ack: Option<Request>,
    pub timers: HashMap<TimerType, TimerId>,
    pub interval: Duration,
    pub retransmissions: u32,
}

/// A SIP transaction
pub struct Transaction {
    key: TransactionKey,
    kind: TransactionKind,
    request: Request,
    remote: SocketAddr,
    listener: Option<Arc<dyn TransactionListener>>,
    pub(crate) inner: Mutex<Inner>,
}

impl Transaction {
    pub(crate) fn new(
        key: TransactionKey,
        kind: TransactionKind,
        request: Request,
        remote: SocketAddr,
        listener: Option<Arc<dyn TransactionListener>>,
    ) -> Self {
        Self {
            key,
            kind,
            request,
            remote,
            listener,
            inner: Mutex::new(Inner {
                state: kind.initial_state(),
                responses: Vec::new(),
                last_response: None,
                ack: None,
                timers: HashMap::new(),
                interval: Duration::ZERO,
                retransmissions: 0,
            }),
        }
    }

    /// Transaction key
    pub fn key(&self) -> &TransactionKey {
        &self.key
    }

    /// Which state machine drives this transaction
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// The request that created the transaction
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Method of the originating request
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Peer address: request destination (client) or source (server)
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    /// Snapshot of the responses seen so far, in order
    pub fn responses(&self) -> Vec<Response> {
        self.inner.lock().responses.clone()
    }

    /// To tag of the latest response seen so far that carries one
    pub fn response_tag(&self) -> Option<String> {
        self.inner
            .lock()
            .responses
            .iter()
            .rev()
            .find_map(|response| response.to_tag().map(str::to_string))
    }

    /// Number of retransmissions sent by this transaction
    pub fn retransmissions(&self) -> u32 {
        self.inner.lock().retransmissions
    }

    /// ACK generated for a non-2xx final response (client INVITE only)
    pub fn ack(&self) -> Option<Request> {
        self.inner.lock().ack.clone()
    }

    pub(crate) fn listener(&self) -> Option<&Arc<dyn TransactionListener>> {
        self.listener.as_ref()
    }

    /// Dispatch a timer expiry. Stale expiries (timer re-armed or cancelled in
    /// the meantime) are ignored.
    pub(crate) fn on_timer(&self, ctx: &TimerContext<'_>, timer: TimerType, id: TimerId) -> Actions {
        let mut actions = Actions::default();
        let mut inner = self.inner.lock();
        if inner.timers.get(&timer) != Some(&id) {
            trace!(id = %self.key, timer = %timer, "Ignoring stale timer");
            return actions;
        }
        inner.timers.remove(&timer);
        trace!(id = %self.key, timer = %timer, state = %inner.state, "Timer fired");

        if self.kind.is_server() {
            self.server_on_timer(&mut inner, ctx, timer, &mut actions);
        } else {
            self.client_on_timer(&mut inner, ctx, timer, &mut actions);
        }
        actions
    }

    /// A send failed: report it and terminate
    pub(crate) fn on_transport_error(&self, ctx: &TimerContext<'_>, error: &str) -> Actions {
        let mut actions = Actions::default();
        let mut inner = self.inner.lock();
        if inner.state.is_terminated() {
            return actions;
        }
        error!(id = %self.key, error = %error, "Transport error, terminating transaction");
        actions.events.push(TransactionEvent::TransportError {
            transaction_id: self.key.clone(),
            error: error.to_string(),
        });
        self.terminate(&mut inner, ctx, &mut actions);
        actions
    }

    /// Move to `to`, which must be a valid forward transition other than Terminated
    pub(crate) fn enter(&self, inner: &mut Inner, to: TransactionState) -> DialogResult<()> {
        TransactionState::validate_transition(inner.state, to, self.kind)?;
        if inner.state != to {
            debug!(id = %self.key, "State transition: {} -> {}", inner.state, to);
            inner.state = to;
        }
        Ok(())
    }

    /// Move to Terminated, disarming every timer
    pub(crate) fn terminate(&self, inner: &mut Inner, ctx: &TimerContext<'_>, actions: &mut Actions) {
        if inner.state.is_terminated() {
            return;
        }
        debug!(id = %self.key, "State transition: {} -> Terminated", inner.state);
        inner.state = TransactionState::Terminated;
        for (_, id) in inner.timers.drain() {
            ctx.wheel.cancel(id);
        }
        actions.events.push(TransactionEvent::Terminated {
            transaction_id: self.key.clone(),
        });
        actions.terminated = true;
    }

    pub(crate) fn arm(&self, inner: &mut Inner, ctx: &TimerContext<'_>, timer: TimerType, delay: Duration) {
        let id = ctx.wheel.schedule(
            delay,
            TimerEntry {
                key: self.key.clone(),
                timer,
            },
        );
        if let Some(old) = inner.timers.insert(timer, id) {
            ctx.wheel.cancel(old);
        }
        trace!(id = %self.key, timer = %timer, delay = ?delay, "Timer armed");
    }

    pub(crate) fn disarm(&self, inner: &mut Inner, ctx: &TimerContext<'_>, timer: TimerType) {
        if let Some(id) = inner.timers.remove(&timer) {
            ctx.wheel.cancel(id);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish()
    }
}
