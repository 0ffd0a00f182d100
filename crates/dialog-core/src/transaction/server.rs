//! Server transaction state machines (RFC 3261 §17.2).
//!
//! INVITE (§17.2.1):
//!
//! ```text
//!   Proceeding --2xx sent--> Terminated
//!       |
//!       +--300-699 sent--> Completed --ACK--> Confirmed --Timer I--> Terminated
//!                             |  ^ Timer G re-sends the response
//!                             +--Timer H--> Terminated (timeout)
//! ```
//!
//! If the TU has not answered an INVITE within the grace interval, a 100 Trying
//! is sent on its behalf.
//!
//! Non-INVITE (§17.2.2): Trying → Proceeding → Completed → Terminated after
//! Timer J. Retransmitted requests are answered with the last response sent.

use tracing::{debug, trace, warn};

use siphon_sip_core::{Message, Method, Request, Response, SipMessage, StatusCode};

use crate::errors::{DialogError, DialogResult};
use crate::transaction::{
    Actions, Inner, TimerContext, TimerType, Transaction, TransactionEvent, TransactionKind,
    TransactionState,
};

impl Transaction {
    /// Arm the 100 Trying grace timer of an INVITE server transaction
    pub(crate) fn start_server(&self, ctx: &TimerContext<'_>) {
        if self.kind() == TransactionKind::InviteServer {
            let mut inner = self.inner.lock();
            self.arm(&mut inner, ctx, TimerType::Trying, ctx.settings.initial(TimerType::Trying));
        }
    }

    /// Send a response through this transaction.
    ///
    /// Fails with an illegal-state error once a final response has been sent.
    pub(crate) fn server_send_response(
        &self,
        ctx: &TimerContext<'_>,
        mut response: Response,
    ) -> DialogResult<Actions> {
        let mut actions = Actions::default();
        let mut inner = self.inner.lock();
        if inner.state.is_final() {
            return Err(DialogError::illegal_state(format!(
                "transaction {} already sent a final response (state {})",
                self.key(),
                inner.state
            )));
        }

        let status = response.status();
        response.commit();
        self.disarm(&mut inner, ctx, TimerType::Trying);

        match (self.kind(), status.is_provisional()) {
            (_, true) => {
                self.enter(&mut inner, TransactionState::Proceeding)?;
            }
            (TransactionKind::InviteServer, false) if status.is_success() => {
                // 2xx reliability belongs to the TU (§13.3.1.4)
                self.record(&mut inner, response, &mut actions);
                self.terminate(&mut inner, ctx, &mut actions);
                return Ok(actions);
            }
            (TransactionKind::InviteServer, false) => {
                self.enter(&mut inner, TransactionState::Completed)?;
                inner.interval = ctx.settings.initial(TimerType::G);
                let interval = inner.interval;
                self.arm(&mut inner, ctx, TimerType::G, interval);
                self.arm(&mut inner, ctx, TimerType::H, ctx.settings.initial(TimerType::H));
            }
            (_, false) => {
                self.enter(&mut inner, TransactionState::Completed)?;
                self.arm(&mut inner, ctx, TimerType::J, ctx.settings.initial(TimerType::J));
            }
        }
        self.record(&mut inner, response, &mut actions);
        Ok(actions)
    }

    /// Handle a request matched to this transaction: a retransmission, or the ACK
    /// of a non-2xx final response
    pub(crate) fn server_on_request(&self, ctx: &TimerContext<'_>, request: &Request) -> Actions {
        let mut actions = Actions::default();
        let mut inner = self.inner.lock();

        if request.method() == &Method::Ack {
            match inner.state {
                TransactionState::Completed if self.kind() == TransactionKind::InviteServer => {
                    if self.enter(&mut inner, TransactionState::Confirmed).is_ok() {
                        self.disarm(&mut inner, ctx, TimerType::G);
                        self.disarm(&mut inner, ctx, TimerType::H);
                        self.arm(&mut inner, ctx, TimerType::I, ctx.settings.initial(TimerType::I));
                    }
                }
                _ => trace!(id = %self.key(), state = %inner.state, "Absorbing ACK"),
            }
            return actions;
        }

        match inner.state {
            TransactionState::Proceeding | TransactionState::Completed => {
                if let Some(last) = inner.last_response.clone() {
                    trace!(id = %self.key(), "Request retransmitted, re-sending last response");
                    actions.sends.push(Message::Response(last));
                }
            }
            _ => trace!(id = %self.key(), state = %inner.state, "Absorbing retransmitted request"),
        }
        actions
    }

    pub(crate) fn server_on_timer(
        &self,
        inner: &mut Inner,
        ctx: &TimerContext<'_>,
        timer: TimerType,
        actions: &mut Actions,
    ) {
        match (timer, inner.state) {
            (TimerType::Trying, TransactionState::Proceeding) if inner.last_response.is_none() => {
                match self.request().create_response(StatusCode::Trying) {
                    Ok(mut trying) => {
                        debug!(id = %self.key(), "TU silent, sending 100 Trying");
                        trying.commit();
                        self.record(inner, trying, actions);
                    }
                    Err(e) => warn!(id = %self.key(), error = %e, "Cannot build 100 Trying"),
                }
            }
            (TimerType::G, TransactionState::Completed) => {
                if let Some(last) = inner.last_response.clone() {
                    inner.retransmissions += 1;
                    trace!(id = %self.key(), count = inner.retransmissions, "Timer G, re-sending response");
                    actions.sends.push(Message::Response(last));
                }
                inner.interval = ctx.settings.next_interval(TimerType::G, inner.interval);
                let interval = inner.interval;
                self.arm(inner, ctx, TimerType::G, interval);
            }
            (TimerType::H, TransactionState::Completed) => {
                warn!(id = %self.key(), "No ACK received before Timer H");
                actions.events.push(TransactionEvent::Timeout {
                    transaction_id: self.key().clone(),
                    timer,
                });
                self.terminate(inner, ctx, actions);
            }
            (TimerType::I, TransactionState::Confirmed) | (TimerType::J, TransactionState::Completed) => {
                self.terminate(inner, ctx, actions);
            }
            _ => debug!(id = %self.key(), timer = %timer, state = %inner.state, "Timer ignored in this state"),
        }
    }

    /// Remember and send a response
    fn record(&self, inner: &mut Inner, response: Response, actions: &mut Actions) {
        inner.responses.push(response.clone());
        inner.last_response = Some(response.clone());
        actions.sends.push(Message::Response(response));
    }
}
