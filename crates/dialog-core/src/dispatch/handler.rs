use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use siphon_sip_core::{Request, SipMessage};

use crate::dispatch::request::ServerRequest;
use crate::errors::DialogResult;
use crate::session::Session;

/// The application stage of the handler chain.
///
/// Receives requests that are bound to their server transaction and resolved
/// to a session. A request may be answered before returning or later from
/// another task, since [`ServerRequest`] owns everything needed to respond.
///
/// An error returned before a final response was sent is answered with the
/// error's status code (e.g. 500).
#[async_trait]
pub trait SipHandler: Send + Sync {
    /// Handle a new request (never ACK)
    async fn handle_request(&self, request: ServerRequest) -> DialogResult<()>;

    /// Handle an ACK for a 2xx response, matched to its session.
    /// ACKs that match no session are dropped before reaching the handler.
    async fn handle_ack(&self, request: Request, session: Arc<Session>) {
        trace!(call_id = ?request.call_id(), session = %session.key(), "ACK received");
    }
}
