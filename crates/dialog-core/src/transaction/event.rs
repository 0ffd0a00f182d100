use tokio::sync::mpsc;

use siphon_sip_core::Response;

use crate::transaction::key::TransactionKey;
use crate::transaction::timer::TimerType;

/// Notifications a transaction delivers to its transaction user.
///
/// Every method has an empty default so implementors pick what they need.
/// Callbacks run synchronously on the task that drove the transition, after the
/// transaction's lock has been released; they must not block.
pub trait TransactionListener: Send + Sync {
    /// A response was received (client) and passed on to the TU.
    /// Retransmissions absorbed by the transaction are not reported.
    fn on_response(&self, _key: &TransactionKey, _response: &Response) {}

    /// Timer B, F or H expired. Exactly one timeout is reported per transaction.
    fn on_timeout(&self, _key: &TransactionKey, _timer: TimerType) {}

    /// A message could not be delivered; the transaction is terminated
    fn on_transport_error(&self, _key: &TransactionKey, _error: &str) {}

    /// The transaction reached Terminated
    fn on_terminated(&self, _key: &TransactionKey) {}
}

/// Events produced by the transaction layer
#[derive(Debug, Clone)]
pub enum TransactionEvent {
    /// A response reached the TU
    Response {
        transaction_id: TransactionKey,
        response: Response,
    },
    /// A timeout timer fired
    Timeout {
        transaction_id: TransactionKey,
        timer: TimerType,
    },
    /// Delivery failed
    TransportError {
        transaction_id: TransactionKey,
        error: String,
    },
    /// The transaction terminated
    Terminated { transaction_id: TransactionKey },
}

impl TransactionEvent {
    /// Key of the transaction the event belongs to
    pub fn transaction_id(&self) -> &TransactionKey {
        match self {
            TransactionEvent::Response { transaction_id, .. }
            | TransactionEvent::Timeout { transaction_id, .. }
            | TransactionEvent::TransportError { transaction_id, .. }
            | TransactionEvent::Terminated { transaction_id } => transaction_id,
        }
    }

    pub(crate) fn deliver(&self, listener: &dyn TransactionListener) {
        match self {
            TransactionEvent::Response { transaction_id, response } => {
                listener.on_response(transaction_id, response)
            }
            TransactionEvent::Timeout { transaction_id, timer } => {
                listener.on_timeout(transaction_id, *timer)
            }
            TransactionEvent::TransportError { transaction_id, error } => {
                listener.on_transport_error(transaction_id, error)
            }
            TransactionEvent::Terminated { transaction_id } => listener.on_terminated(transaction_id),
        }
    }
}

/// Adapter forwarding listener callbacks into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<TransactionEvent>,
}

impl ChannelListener {
    /// Listener plus the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransactionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: TransactionEvent) {
        // The receiver going away just means nobody is interested anymore
        let _ = self.tx.send(event);
    }
}

impl TransactionListener for ChannelListener {
    fn on_response(&self, key: &TransactionKey, response: &Response) {
        self.forward(TransactionEvent::Response {
            transaction_id: key.clone(),
            response: response.clone(),
        });
    }

    fn on_timeout(&self, key: &TransactionKey, timer: TimerType) {
        self.forward(TransactionEvent::Timeout {
            transaction_id: key.clone(),
            timer,
        });
    }

    fn on_transport_error(&self, key: &TransactionKey, error: &str) {
        self.forward(TransactionEvent::TransportError {
            transaction_id: key.clone(),
            error: error.to_string(),
        });
    }

    fn on_terminated(&self, key: &TransactionKey) {
        self.forward(TransactionEvent::Terminated {
            transaction_id: key.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siphon_sip_core::{Method, StatusCode};

    #[test]
    fn test_channel_listener_forwards_in_order() {
        let (listener, mut rx) = ChannelListener::new();
        let key = TransactionKey::new("z9hG4bK1", Method::Options, false);
        listener.on_response(&key, &Response::new(StatusCode::Ok));
        listener.on_timeout(&key, TimerType::F);
        listener.on_terminated(&key);

        assert!(matches!(rx.try_recv(), Ok(TransactionEvent::Response { .. })));
        assert!(matches!(
            rx.try_recv(),
            Ok(TransactionEvent::Timeout { timer: TimerType::F, .. })
        ));
        let last = rx.try_recv().unwrap();
        assert_eq!(last.transaction_id(), &key);
        assert!(matches!(last, TransactionEvent::Terminated { .. }));
    }
}
