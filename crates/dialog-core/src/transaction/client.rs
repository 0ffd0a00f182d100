//! Client transaction state machines (RFC 3261 §17.1).
//!
//! INVITE (§17.1.1):
//!
//! ```text
//!   Calling --1xx--> Proceeding --300-699--> Completed --Timer D--> Terminated
//!      |                 |                      ^  (ACK sent, re-sent on
//!      |                 +--------2xx------------+---> Terminated   retransmitted finals)
//!      +--Timer B--> Terminated (timeout)
//! ```
//!
//! Non-INVITE (§17.1.2): Trying → Proceeding → Completed → Terminated after
//! Timer K; Timer E retransmits, Timer F is the timeout.

use tracing::{debug, trace, warn};

use siphon_sip_core::{CSeq, Message, Method, Request, Response, SipHeader, SipMessage};

use crate::errors::{DialogError, DialogResult};
use crate::transaction::{
    Actions, Inner, TimerContext, TimerType, Transaction, TransactionEvent, TransactionKind,
    TransactionState,
};

/// Max-Forwards of generated requests
const MAX_FORWARDS: &str = "70";

impl Transaction {
    /// Send the request and arm the initial timers
    pub(crate) fn start_client(&self, ctx: &TimerContext<'_>) -> Actions {
        let mut actions = Actions::default();
        let mut inner = self.inner.lock();
        actions.sends.push(Message::Request(self.request().clone()));

        let (retransmit, timeout) = match self.kind() {
            TransactionKind::InviteClient => (TimerType::A, TimerType::B),
            _ => (TimerType::E, TimerType::F),
        };
        inner.interval = ctx.settings.initial(retransmit);
        let interval = inner.interval;
        self.arm(&mut inner, ctx, retransmit, interval);
        self.arm(&mut inner, ctx, timeout, ctx.settings.initial(timeout));
        actions
    }

    /// Feed a received response into the state machine
    pub(crate) fn client_on_response(
        &self,
        ctx: &TimerContext<'_>,
        response: Response,
    ) -> DialogResult<Actions> {
        let mut actions = Actions::default();
        let mut inner = self.inner.lock();
        let status = response.status();

        match self.kind() {
            TransactionKind::InviteClient => match inner.state {
                TransactionState::Calling | TransactionState::Proceeding => {
                    if status.is_provisional() {
                        self.enter(&mut inner, TransactionState::Proceeding)?;
                        self.disarm(&mut inner, ctx, TimerType::A);
                        self.disarm(&mut inner, ctx, TimerType::B);
                        self.deliver(&mut inner, response, &mut actions);
                    } else if status.is_success() {
                        self.deliver(&mut inner, response, &mut actions);
                        self.terminate(&mut inner, ctx, &mut actions);
                    } else {
                        let ack = build_ack(self.request(), &response)?;
                        self.enter(&mut inner, TransactionState::Completed)?;
                        self.disarm(&mut inner, ctx, TimerType::A);
                        self.disarm(&mut inner, ctx, TimerType::B);
                        actions.sends.push(Message::Request(ack.clone()));
                        inner.ack = Some(ack);
                        self.arm(&mut inner, ctx, TimerType::D, ctx.settings.initial(TimerType::D));
                        self.deliver(&mut inner, response, &mut actions);
                    }
                }
                TransactionState::Completed => {
                    if status.is_final() && !status.is_success() {
                        if let Some(ack) = inner.ack.clone() {
                            trace!(id = %self.key(), "Final response retransmitted, re-sending ACK");
                            actions.sends.push(Message::Request(ack));
                        }
                    }
                }
                TransactionState::Terminated if status.is_success() => {
                    // 2xx retransmissions go to the TU, which owns the ACK for 2xx
                    trace!(id = %self.key(), "Passing retransmitted 2xx to the TU");
                    actions.events.push(TransactionEvent::Response {
                        transaction_id: self.key().clone(),
                        response,
                    });
                }
                _ => trace!(id = %self.key(), status = %status, "Absorbing response"),
            },
            _ => match inner.state {
                TransactionState::Trying | TransactionState::Proceeding => {
                    if status.is_provisional() {
                        self.enter(&mut inner, TransactionState::Proceeding)?;
                        self.deliver(&mut inner, response, &mut actions);
                    } else {
                        self.enter(&mut inner, TransactionState::Completed)?;
                        self.disarm(&mut inner, ctx, TimerType::E);
                        self.disarm(&mut inner, ctx, TimerType::F);
                        self.arm(&mut inner, ctx, TimerType::K, ctx.settings.initial(TimerType::K));
                        self.deliver(&mut inner, response, &mut actions);
                    }
                }
                _ => trace!(id = %self.key(), status = %status, "Absorbing response"),
            },
        }
        Ok(actions)
    }

    pub(crate) fn client_on_timer(
        &self,
        inner: &mut Inner,
        ctx: &TimerContext<'_>,
        timer: TimerType,
        actions: &mut Actions,
    ) {
        match (timer, inner.state) {
            (TimerType::A, TransactionState::Calling) => {
                self.retransmit_request(inner, ctx, TimerType::A, actions);
            }
            (TimerType::E, TransactionState::Trying | TransactionState::Proceeding) => {
                if inner.state == TransactionState::Proceeding {
                    // §17.1.2.2: once Proceeding, Timer E fires every T2
                    inner.interval = ctx.settings.t2();
                }
                self.retransmit_request(inner, ctx, TimerType::E, actions);
            }
            (TimerType::B, TransactionState::Calling)
            | (TimerType::F, TransactionState::Trying | TransactionState::Proceeding) => {
                warn!(id = %self.key(), timer = %timer, "Transaction timed out");
                actions.events.push(TransactionEvent::Timeout {
                    transaction_id: self.key().clone(),
                    timer,
                });
                self.terminate(inner, ctx, actions);
            }
            (TimerType::D | TimerType::K, TransactionState::Completed) => {
                self.terminate(inner, ctx, actions);
            }
            _ => debug!(id = %self.key(), timer = %timer, state = %inner.state, "Timer ignored in this state"),
        }
    }

    fn retransmit_request(
        &self,
        inner: &mut Inner,
        ctx: &TimerContext<'_>,
        timer: TimerType,
        actions: &mut Actions,
    ) {
        inner.retransmissions += 1;
        trace!(id = %self.key(), timer = %timer, count = inner.retransmissions, "Retransmitting request");
        actions.sends.push(Message::Request(self.request().clone()));
        inner.interval = ctx.settings.next_interval(timer, inner.interval);
        let interval = inner.interval;
        self.arm(inner, ctx, timer, interval);
    }

    fn deliver(&self, inner: &mut Inner, response: Response, actions: &mut Actions) {
        inner.responses.push(response.clone());
        actions.events.push(TransactionEvent::Response {
            transaction_id: self.key().clone(),
            response,
        });
    }
}

/// ACK for a non-2xx final response (RFC 3261 §17.1.1.3).
///
/// Request-URI, Call-ID, From and the CSeq number come from the INVITE, To
/// (with its tag) from the response. The single Via is the INVITE's topmost Via,
/// and the INVITE's Route headers are kept.
pub fn build_ack(invite: &Request, response: &Response) -> DialogResult<Request> {
    let headers = invite.headers();
    let via = invite
        .top_via()
        .ok_or_else(|| DialogError::protocol("INVITE has no Via"))?;
    let from = headers
        .get(SipHeader::From)
        .ok_or_else(|| DialogError::protocol("INVITE has no From"))?;
    let to = response
        .headers()
        .get(SipHeader::To)
        .ok_or_else(|| DialogError::protocol("response has no To"))?;
    let call_id = invite
        .call_id()
        .ok_or_else(|| DialogError::protocol("INVITE has no Call-ID"))?;
    let cseq = invite
        .cseq()
        .ok_or_else(|| DialogError::protocol("INVITE has no CSeq"))?;

    let mut builder = Request::builder(Method::Ack, invite.uri().clone())
        .header(SipHeader::Via, via.clone());
    for route in headers.get_all(SipHeader::Route) {
        builder = builder.header(SipHeader::Route, route.clone());
    }
    let ack = builder
        .header(SipHeader::MaxForwards, MAX_FORWARDS)
        .header(SipHeader::From, from.clone())
        .header(SipHeader::To, to.clone())
        .header(SipHeader::CallId, call_id)
        .header(SipHeader::CSeq, CSeq::new(cseq.seq, Method::Ack).to_string())
        .build();
    Ok(ack)
}
