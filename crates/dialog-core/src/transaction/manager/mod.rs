//! # Transaction Layer
//!
//! [`TransactionLayer`] owns the transaction table and the two background
//! tasks that keep transactions moving:
//!
//! - the **timer driver**, which sleeps until the earliest deadline of the shared
//!   [`TimerWheel`] and fires due timers into their transactions,
//! - the **send worker**, which drains the outbound queue. State machines only
//!   enqueue messages, so nothing is sent while a transaction is locked. A failed
//!   send is fed back into the owning transaction as a transport error.
//!
//! The table is a `DashMap`, so lookups and inserts for unrelated transactions
//! never contend on a global lock. Terminated transactions stay in the table for
//! the configured cleanup delay to absorb late retransmissions, then are evicted.
//! `max_transactions` bounds live transactions only; entries waiting out the
//! cleanup delay do not count against it.
//!
//! ## Inbound requests
//!
//! [`TransactionLayer::admit`] is the entry point for requests from the wire:
//!
//! | Request                          | Result                                   |
//! |----------------------------------|------------------------------------------|
//! | first copy                       | [`Admission::New`] with a new transaction |
//! | retransmission                   | [`Admission::Matched`], absorbed or answered with the last response |
//! | ACK for a non-2xx final response | [`Admission::Matched`], INVITE transaction moves to Confirmed |
//! | ACK for a 2xx                    | [`Admission::StrayAck`], left to the dialog layer |
//!
//! A CANCEL is admitted as a transaction of its own; [`TransactionLayer::handle_cancel`]
//! then answers it and terminates the target INVITE with a 487.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use siphon_infra_common::{ListenerId, ListenerRegistry};
use siphon_sip_core::{
    generate_branch, generate_tag, Message, Method, Request, Response, SipHeader, SipMessage,
    StatusCode, Via,
};
use siphon_sip_transport::Transport;

use crate::errors::{DialogError, DialogResult};
use crate::transaction::timer::{TimerId, TimerWheel};
use crate::transaction::{
    Actions, TimerContext, TimerEntry, TimerSettings, TimerType, Transaction, TransactionKey,
    TransactionKind, TransactionListener, TransactionState,
};

/// Outcome of [`TransactionLayer::admit`]
#[derive(Debug)]
pub enum Admission {
    /// First copy of a request; a server transaction was created for it
    New(Arc<Transaction>),
    /// The request belongs to an existing transaction and was handled there
    Matched(Arc<Transaction>),
    /// An ACK matching no transaction (ACK for a 2xx)
    StrayAck(Request),
}

/// Outcome of [`TransactionLayer::handle_cancel`]
#[derive(Debug)]
pub enum CancelOutcome {
    /// The INVITE was still pending and was answered with 487
    Cancelled(Arc<Transaction>),
    /// The INVITE had already been answered; the CANCEL had no effect
    AlreadyAnswered(Arc<Transaction>),
    /// No INVITE matches; the CANCEL was answered with 481
    NoTarget,
}

struct Outbound {
    key: Option<TransactionKey>,
    message: Message,
    destination: SocketAddr,
}

struct LayerInner {
    transport: Arc<dyn Transport>,
    settings: TimerSettings,
    max_transactions: usize,
    transactions: DashMap<TransactionKey, Arc<Transaction>>,
    /// Transactions inserted and not terminated yet
    live: AtomicUsize,
    wheel: Arc<TimerWheel<TimerEntry>>,
    listeners: ListenerRegistry<dyn TransactionListener>,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: watch::Sender<bool>,
}

/// Transaction table plus its timer driver and send worker
#[derive(Clone)]
pub struct TransactionLayer {
    inner: Arc<LayerInner>,
}

impl TransactionLayer {
    /// Create the layer and spawn its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, settings: TimerSettings, max_transactions: usize) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let wheel = Arc::new(TimerWheel::new());

        let inner = Arc::new(LayerInner {
            transport: transport.clone(),
            settings,
            max_transactions,
            transactions: DashMap::new(),
            live: AtomicUsize::new(0),
            wheel: wheel.clone(),
            listeners: ListenerRegistry::new(),
            outbound,
            shutdown,
        });

        tokio::spawn(run_send_worker(transport, outbound_rx, Arc::downgrade(&inner)));
        tokio::spawn(run_timer_driver(wheel, Arc::downgrade(&inner), shutdown_rx));

        debug!(max_transactions, "Transaction layer started");
        Self { inner }
    }

    /// Timer configuration
    pub fn settings(&self) -> &TimerSettings {
        &self.inner.settings
    }

    /// Transport used for sending
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Number of transactions in the table, terminated ones included
    pub fn count(&self) -> usize {
        self.inner.transactions.len()
    }

    /// Number of transactions not terminated yet; this is what
    /// `max_transactions` limits
    pub fn live_count(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Look a transaction up by key
    pub fn get(&self, key: &TransactionKey) -> Option<Arc<Transaction>> {
        self.inner.get(key)
    }

    /// Register a listener notified of events of every transaction
    pub fn add_listener(&self, listener: Arc<dyn TransactionListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Find the server transaction an incoming request belongs to.
    ///
    /// ACK matches the INVITE transaction only while it waits for the ACK of a
    /// non-2xx response; an ACK for a 2xx is a new transaction and yields `None`.
    pub fn match_request(&self, request: &Request) -> Option<Arc<Transaction>> {
        let key = TransactionKey::from_request(request)?;
        let tx = self.inner.get(&key)?;
        if request.method() == &Method::Ack
            && !matches!(tx.state(), TransactionState::Completed | TransactionState::Confirmed)
        {
            return None;
        }
        Some(tx)
    }

    /// Create a server transaction for a request seen for the first time
    pub fn create_server_transaction(
        &self,
        request: Request,
        source: SocketAddr,
    ) -> DialogResult<Arc<Transaction>> {
        let key = TransactionKey::from_request(&request)
            .ok_or_else(|| DialogError::protocol("request has no Via branch"))?;
        let (tx, created) = self.insert_server(key, request, source)?;
        if !created {
            return Err(DialogError::illegal_state(format!(
                "server transaction {} already exists",
                tx.key()
            )));
        }
        Ok(tx)
    }

    /// Match an incoming request or create its server transaction.
    ///
    /// Retransmissions racing each other produce exactly one
    /// [`Admission::New`]; every other copy is [`Admission::Matched`].
    pub fn admit(&self, request: Request, source: SocketAddr) -> DialogResult<Admission> {
        if let Some(tx) = self.match_request(&request) {
            self.receive_request(&tx, &request)?;
            return Ok(Admission::Matched(tx));
        }
        if request.method() == &Method::Ack {
            return Ok(Admission::StrayAck(request));
        }

        let key = TransactionKey::from_request(&request)
            .ok_or_else(|| DialogError::protocol("request has no Via branch"))?;
        let (tx, created) = self.insert_server(key, request.clone(), source)?;
        if created {
            Ok(Admission::New(tx))
        } else {
            self.receive_request(&tx, &request)?;
            Ok(Admission::Matched(tx))
        }
    }

    fn insert_server(
        &self,
        key: TransactionKey,
        request: Request,
        source: SocketAddr,
    ) -> DialogResult<(Arc<Transaction>, bool)> {
        let kind = if request.method() == &Method::Invite {
            TransactionKind::InviteServer
        } else {
            TransactionKind::NonInviteServer
        };
        let (tx, created) = self.inner.insert(key.clone(), || {
            Transaction::new(key, kind, request, source, None)
        })?;
        if created {
            debug!(id = %tx.key(), source = %source, "Created server transaction");
            tx.start_server(&self.inner.ctx());
        }
        Ok((tx, created))
    }

    /// Send `request` through a new client transaction.
    ///
    /// A topmost Via with a fresh branch is added when the request has none.
    /// Responses and timeouts are reported to `listener` and to the layer-wide
    /// listeners.
    pub fn create_client_transaction(
        &self,
        mut request: Request,
        destination: SocketAddr,
        listener: Option<Arc<dyn TransactionListener>>,
    ) -> DialogResult<Arc<Transaction>> {
        if request.method() == &Method::Ack {
            return Err(DialogError::illegal_state(
                "ACK is not sent through a client transaction",
            ));
        }
        let branch = self.ensure_branch(&mut request)?;
        request.commit();

        let kind = if request.method() == &Method::Invite {
            TransactionKind::InviteClient
        } else {
            TransactionKind::NonInviteClient
        };
        let key = TransactionKey::new(branch, request.method().clone(), false);
        let (tx, created) = self.inner.insert(key.clone(), || {
            Transaction::new(key, kind, request, destination, listener)
        })?;
        if !created {
            return Err(DialogError::illegal_state(format!(
                "client transaction {} already exists",
                tx.key()
            )));
        }

        debug!(id = %tx.key(), destination = %destination, "Created client transaction");
        let actions = tx.start_client(&self.inner.ctx());
        self.inner.apply(&tx, actions);
        Ok(tx)
    }

    fn ensure_branch(&self, request: &mut Request) -> DialogResult<String> {
        if let Some(branch) = request.branch().filter(|b| !b.is_empty()) {
            return Ok(branch.to_string());
        }
        let branch = generate_branch();
        let headers = request.core_mut().headers_mut()?;
        match headers.get_mut(SipHeader::Via).and_then(|v| v.as_via_mut()) {
            Some(via) => via.set_branch(branch.clone()),
            None => {
                let local = self.inner.transport.local_addr()?;
                let via = Via::new("UDP", local.ip().to_string(), Some(local.port()), branch.clone());
                headers.push_front(SipHeader::Via, via);
            }
        }
        Ok(branch)
    }

    /// Send a response through a server transaction
    pub fn send_response(&self, tx: &Arc<Transaction>, response: Response) -> DialogResult<()> {
        if !tx.kind().is_server() {
            return Err(DialogError::illegal_state(format!(
                "cannot send a response through client transaction {}",
                tx.key()
            )));
        }
        let actions = tx.server_send_response(&self.inner.ctx(), response)?;
        self.inner.apply(tx, actions);
        Ok(())
    }

    /// Feed a response into a client transaction
    pub fn receive_response(&self, tx: &Arc<Transaction>, response: Response) -> DialogResult<()> {
        if tx.kind().is_server() {
            return Err(DialogError::illegal_state(format!(
                "cannot receive a response on server transaction {}",
                tx.key()
            )));
        }
        let actions = tx.client_on_response(&self.inner.ctx(), response)?;
        self.inner.apply(tx, actions);
        Ok(())
    }

    /// Feed a retransmitted request (or an ACK) into a server transaction
    pub fn receive_request(&self, tx: &Arc<Transaction>, request: &Request) -> DialogResult<()> {
        if !tx.kind().is_server() {
            return Err(DialogError::illegal_state(format!(
                "cannot receive a request on client transaction {}",
                tx.key()
            )));
        }
        let actions = tx.server_on_request(&self.inner.ctx(), request);
        self.inner.apply(tx, actions);
        Ok(())
    }

    /// Route a response from the wire to its client transaction.
    ///
    /// Returns `false` when no transaction matches; the response is discarded.
    pub fn handle_response(&self, response: Response) -> bool {
        let Some(key) = TransactionKey::from_response(&response) else {
            warn!("Discarding response without branch or CSeq");
            return false;
        };
        let Some(tx) = self.inner.get(&key) else {
            debug!(id = %key, status = %response.status(), "Discarding response matching no transaction");
            return false;
        };
        if let Err(e) = self.receive_response(&tx, response) {
            warn!(id = %key, error = %e, "Failed to process response");
        }
        true
    }

    /// Apply a CANCEL (already admitted as its own transaction) to its target INVITE.
    ///
    /// The CANCEL is answered with 200 when the INVITE exists and with 481
    /// otherwise. A pending INVITE is answered with 487; if the TU answers the
    /// INVITE concurrently, whichever response takes the INVITE's lock first wins.
    pub fn handle_cancel(&self, cancel: &Arc<Transaction>) -> DialogResult<CancelOutcome> {
        self.handle_cancel_with_tag(cancel, None)
    }

    /// [`TransactionLayer::handle_cancel`] with the To tag the TU would answer
    /// the INVITE with.
    ///
    /// The 487 and the 200 to the CANCEL reuse the tag of a response already
    /// sent for the INVITE, else the INVITE's own To tag, else `local_tag`, and
    /// only then a fresh one.
    pub fn handle_cancel_with_tag(
        &self,
        cancel: &Arc<Transaction>,
        local_tag: Option<&str>,
    ) -> DialogResult<CancelOutcome> {
        if cancel.method() != &Method::Cancel || !cancel.kind().is_server() {
            return Err(DialogError::illegal_state(format!(
                "{} is not a CANCEL server transaction",
                cancel.key()
            )));
        }

        let target_key = cancel.key().with_method(Method::Invite);
        let Some(target) = self.inner.get(&target_key) else {
            debug!(id = %cancel.key(), "CANCEL matches no INVITE");
            let response = cancel
                .request()
                .create_response(StatusCode::CallOrTransactionDoesNotExist)?;
            self.send_response(cancel, response)?;
            return Ok(CancelOutcome::NoTarget);
        };

        let tag = target
            .response_tag()
            .or_else(|| target.request().to_tag().map(str::to_string))
            .or_else(|| local_tag.map(str::to_string))
            .unwrap_or_else(generate_tag);
        let mut ok = cancel.request().create_response(StatusCode::Ok)?;
        ok.core_mut().set_to_tag(&tag)?;
        self.send_response(cancel, ok)?;

        if target.state() != TransactionState::Proceeding {
            return Ok(CancelOutcome::AlreadyAnswered(target));
        }
        let mut terminated = target.request().create_response(StatusCode::RequestTerminated)?;
        terminated.core_mut().set_to_tag(&tag)?;
        match self.send_response(&target, terminated) {
            Ok(()) => {
                debug!(id = %target.key(), "INVITE cancelled");
                Ok(CancelOutcome::Cancelled(target))
            }
            Err(DialogError::IllegalState { .. }) => Ok(CancelOutcome::AlreadyAnswered(target)),
            Err(e) => Err(e),
        }
    }

    /// Send the ACK for a 2xx outside any transaction, under a Via with a
    /// fresh branch (RFC 3261 §13.2.2.4). Returns the ACK as sent, for
    /// re-sending on 2xx retransmissions.
    pub fn send_ack(&self, mut ack: Request, destination: SocketAddr) -> DialogResult<Request> {
        if ack.method() != &Method::Ack {
            return Err(DialogError::illegal_state(format!(
                "{} is not an ACK",
                ack.method()
            )));
        }
        self.ensure_branch(&mut ack)?;
        ack.commit();
        self.send_stateless(ack.clone(), destination)?;
        Ok(ack)
    }

    /// Send a message outside any transaction (ACK for 2xx, stateless 503)
    pub fn send_stateless(&self, message: impl Into<Message>, destination: SocketAddr) -> DialogResult<()> {
        let mut message = message.into();
        message.commit();
        self.inner.enqueue(None, message, destination)
    }

    /// Stop the timer driver. Pending timers no longer fire.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
        debug!("Transaction layer shut down");
    }
}

impl LayerInner {
    fn ctx(&self) -> TimerContext<'_> {
        TimerContext {
            wheel: &self.wheel,
            settings: &self.settings,
        }
    }

    fn get(&self, key: &TransactionKey) -> Option<Arc<Transaction>> {
        // Clone out of the shard guard before anything takes the transaction lock
        self.transactions.get(key).map(|entry| entry.value().clone())
    }

    fn insert<F>(&self, key: TransactionKey, make: F) -> DialogResult<(Arc<Transaction>, bool)>
    where
        F: FnOnce() -> Transaction,
    {
        match self.transactions.entry(key) {
            Entry::Occupied(entry) => Ok((entry.get().clone(), false)),
            Entry::Vacant(entry) => {
                if self.live.fetch_add(1, Ordering::AcqRel) >= self.max_transactions {
                    self.live.fetch_sub(1, Ordering::AcqRel);
                    warn!(limit = self.max_transactions, "Transaction table full");
                    return Err(DialogError::ResourceExhausted {
                        resource: "transactions".to_string(),
                        limit: self.max_transactions,
                    });
                }
                let tx = Arc::new(make());
                entry.insert(tx.clone());
                Ok((tx, true))
            }
        }
    }

    fn enqueue(&self, key: Option<TransactionKey>, message: Message, destination: SocketAddr) -> DialogResult<()> {
        self.outbound
            .send(Outbound {
                key,
                message,
                destination,
            })
            .map_err(|_| DialogError::Transport {
                message: "send queue closed".to_string(),
            })
    }

    /// Carry out what a transition decided, outside the transaction lock
    fn apply(&self, tx: &Arc<Transaction>, actions: Actions) {
        for message in actions.sends {
            if let Err(e) = self.enqueue(Some(tx.key().clone()), message, tx.remote_addr()) {
                warn!(id = %tx.key(), error = %e, "Dropping outbound message");
            }
        }
        for event in &actions.events {
            if let Some(listener) = tx.listener() {
                event.deliver(listener.as_ref());
            }
            self.listeners.notify(|l| event.deliver(l));
        }
        if actions.terminated {
            self.live.fetch_sub(1, Ordering::AcqRel);
            let delay = self.settings.initial(TimerType::Cleanup);
            if delay.is_zero() {
                self.evict(tx.key());
            } else {
                self.wheel.schedule(
                    delay,
                    TimerEntry {
                        key: tx.key().clone(),
                        timer: TimerType::Cleanup,
                    },
                );
            }
        }
    }

    fn evict(&self, key: &TransactionKey) {
        if self
            .transactions
            .remove_if(key, |_, tx| tx.state().is_terminated())
            .is_some()
        {
            trace!(id = %key, "Evicted terminated transaction");
        }
    }

    fn fire(&self, id: TimerId, entry: TimerEntry) {
        if entry.timer == TimerType::Cleanup {
            self.evict(&entry.key);
            return;
        }
        let Some(tx) = self.get(&entry.key) else {
            return;
        };
        let actions = tx.on_timer(&self.ctx(), entry.timer, id);
        self.apply(&tx, actions);
    }

    fn transport_error(&self, key: &TransactionKey, error: &str) {
        if let Some(tx) = self.get(key) {
            let actions = tx.on_transport_error(&self.ctx(), error);
            self.apply(&tx, actions);
        }
    }
}

async fn run_send_worker(
    transport: Arc<dyn Transport>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    layer: Weak<LayerInner>,
) {
    while let Some(out) = rx.recv().await {
        trace!(destination = %out.destination, "Sending {}", out.message.start_line());
        if let Err(e) = transport.send_message(out.message, out.destination).await {
            warn!(destination = %out.destination, error = %e, "Send failed");
            if let (Some(key), Some(layer)) = (out.key, layer.upgrade()) {
                layer.transport_error(&key, &e.to_string());
            }
        }
    }
    debug!("Send worker stopped");
}

async fn run_timer_driver(
    wheel: Arc<TimerWheel<TimerEntry>>,
    layer: Weak<LayerInner>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = wheel.next_deadline();
        let sleep = async {
            match next {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = sleep => {}
            _ = wheel.changed() => continue,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let due = wheel.poll(Instant::now());
        let Some(layer) = layer.upgrade() else {
            break;
        };
        for (id, entry) in due {
            layer.fire(id, entry);
        }
    }
    debug!("Timer driver stopped");
}
