//! Core lifecycle: [`SipServer`]
//!
//! The hosting layer creates the server with a transport and its event
//! receiver, calls [`SipServer::start`] and, when done, [`SipServer::shutdown`].
//! Nothing runs before `start` apart from the transaction layer's timer driver,
//! which is idle until the first transaction exists.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use siphon_sip_core::{generate_tag, Message, Method, Request, SipMessage, StatusCode};
use siphon_sip_transport::{Transport, TransportEvent};

use crate::config::CoreConfig;
use crate::dispatch::call::Call;
use crate::dispatch::handler::SipHandler;
use crate::dispatch::session_handler::SessionHandler;
use crate::dispatch::DispatchContext;
use crate::errors::{DialogError, DialogResult};
use crate::session::SessionManager;
use crate::transaction::{
    Admission, CancelOutcome, Transaction, TransactionLayer, TransactionListener,
};

/// SIP signaling core: transaction layer, session layer and handler chain
/// wired to one transport
pub struct SipServer {
    config: CoreConfig,
    transport: Arc<dyn Transport>,
    context: Arc<DispatchContext>,
    dispatcher: Arc<SessionHandler>,
    events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl SipServer {
    /// Build the core. Must be called from within a Tokio runtime.
    pub fn new(
        config: CoreConfig,
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
        handler: Arc<dyn SipHandler>,
    ) -> DialogResult<Self> {
        config.validate()?;
        let layer = TransactionLayer::new(transport.clone(), config.timers.clone(), config.max_transactions);
        let sessions = Arc::new(SessionManager::from_config(&config));
        let context = Arc::new(DispatchContext::new(layer, sessions));
        let dispatcher = Arc::new(SessionHandler::new(context.clone(), handler));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            transport,
            context,
            dispatcher,
            events: Mutex::new(Some(events)),
            tasks: Mutex::new(Vec::new()),
            shutdown,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn transaction_layer(&self) -> &TransactionLayer {
        &self.context.layer
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.context.sessions
    }

    pub fn local_addr(&self) -> DialogResult<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Start the inbound loop and the session sweeper
    pub fn start(&self) -> DialogResult<()> {
        let events = self
            .events
            .lock()
            .take()
            .ok_or_else(|| DialogError::illegal_state("server already started"))?;

        let inbound = tokio::spawn(run_inbound(
            events,
            self.context.clone(),
            self.dispatcher.clone(),
            self.shutdown.subscribe(),
        ));
        let sweeper = tokio::spawn(run_sweeper(
            self.context.sessions.clone(),
            self.config.sweep_interval(),
            self.shutdown.subscribe(),
        ));
        self.tasks.lock().extend([inbound, sweeper]);

        info!(local_addr = ?self.transport.local_addr().ok(), "SIP server started");
        Ok(())
    }

    /// Stop the loops, the transaction timers and the transport
    pub async fn shutdown(&self) -> DialogResult<()> {
        let _ = self.shutdown.send(true);
        self.context.layer.shutdown();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Server task ended abnormally");
            }
        }
        self.transport.close().await?;
        info!("SIP server stopped");
        Ok(())
    }

    /// New outgoing call; see [`Call::create_initial_request`]
    pub fn create_call(&self) -> Arc<Call> {
        Call::new(self.context.clone())
    }

    /// Send a request through a new client transaction
    pub fn send_request(
        &self,
        request: Request,
        destination: SocketAddr,
        listener: Option<Arc<dyn TransactionListener>>,
    ) -> DialogResult<Arc<Transaction>> {
        self.context.layer.create_client_transaction(request, destination, listener)
    }
}

async fn run_inbound(
    mut events: mpsc::Receiver<TransportEvent>,
    context: Arc<DispatchContext>,
    dispatcher: Arc<SessionHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(TransportEvent::MessageReceived { message, source, .. }) => {
                    let context = context.clone();
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        route_message(&context, &dispatcher, message, source).await;
                    });
                }
                Some(TransportEvent::Error { error }) => warn!(error = %error, "Transport error"),
                Some(TransportEvent::Closed) | None => {
                    debug!("Transport closed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("Inbound loop stopped");
}

async fn run_sweeper(
    sessions: Arc<SessionManager>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sessions.sweep(Instant::now());
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("Session sweeper stopped");
}

/// Route one inbound message through the transaction layer and the handler chain
pub(crate) async fn route_message(
    context: &DispatchContext,
    dispatcher: &SessionHandler,
    message: Message,
    source: SocketAddr,
) {
    let request = match message {
        Message::Response(response) => {
            context.layer.handle_response(response);
            return;
        }
        Message::Request(request) => request,
    };

    if request.branch().filter(|b| !b.is_empty()).is_none() {
        if request.method() != &Method::Ack {
            warn!(source = %source, method = %request.method(), "Request without Via branch");
            send_stateless(context, &request, StatusCode::BadRequest, source);
        }
        return;
    }

    let is_ack = request.method() == &Method::Ack;
    match context.layer.admit(request.clone(), source) {
        Ok(Admission::New(transaction)) if transaction.method() == &Method::Cancel => {
            let local_tag = context.pending_tag(&transaction);
            match context.layer.handle_cancel_with_tag(&transaction, local_tag.as_deref()) {
                Ok(CancelOutcome::Cancelled(invite)) => context.cancelled(&invite),
                Ok(outcome) => debug!(id = %transaction.key(), ?outcome, "CANCEL had no effect"),
                Err(e) => warn!(id = %transaction.key(), error = %e, "CANCEL failed"),
            }
        }
        Ok(Admission::New(transaction)) => dispatcher.handle(transaction, request, source).await,
        Ok(Admission::Matched(transaction)) => {
            trace!(id = %transaction.key(), "Request absorbed by its transaction");
        }
        Ok(Admission::StrayAck(ack)) => dispatcher.handle_ack(ack, source).await,
        Err(e @ DialogError::ResourceExhausted { .. }) => {
            if !is_ack {
                warn!(source = %source, error = %e, "Shedding request");
                send_stateless(context, &request, e.status_code(), source);
            }
        }
        Err(e) => warn!(source = %source, error = %e, "Dropping request"),
    }
}

fn send_stateless(context: &DispatchContext, request: &Request, status: StatusCode, destination: SocketAddr) {
    let response = request.create_response(status).and_then(|mut response| {
        if response.to_tag().is_none() {
            response.core_mut().set_to_tag(&generate_tag())?;
        }
        Ok(response)
    });
    let result = response
        .map_err(DialogError::from)
        .and_then(|response| context.layer.send_stateless(response, destination));
    if let Err(e) = result {
        warn!(destination = %destination, status = %status, error = %e, "Could not send stateless response");
    }
}
