//! In-process transport.
//!
//! Sent messages are recorded instead of leaving the process, and inbound traffic
//! is injected by hand. Used to drive the transaction and dialog layers in tests
//! and in embedded setups that bridge SIP over some other channel.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use siphon_sip_core::{Message, SipMessage};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent};

/// A message handed to [`MemoryTransport::send_message`]
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Message as sent
    pub message: Message,
    /// Destination it was sent to
    pub destination: SocketAddr,
}

/// Transport that records outbound messages in memory
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    local_addr: SocketAddr,
    sent: Mutex<Vec<SentMessage>>,
    sent_signal: Notify,
    fail_sends: AtomicBool,
    closed: AtomicBool,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl MemoryTransport {
    /// New transport reporting `local_addr`, plus its event receiver
    pub fn new(local_addr: SocketAddr) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::channel(1024);
        let transport = Self {
            inner: Arc::new(MemoryInner {
                local_addr,
                sent: Mutex::new(Vec::new()),
                sent_signal: Notify::new(),
                fail_sends: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                events_tx,
            }),
        };
        (transport, events_rx)
    }

    /// Deliver `message` as if it arrived from `source`
    pub async fn inject(&self, message: impl Into<Message>, source: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        self.inner
            .events_tx
            .send(TransportEvent::MessageReceived {
                message: message.into(),
                source,
                destination: self.inner.local_addr,
            })
            .await
            .map_err(|_| Error::TransportClosed)
    }

    /// Parse `bytes` and deliver the result, as the UDP receive loop would
    pub async fn inject_bytes(&self, bytes: &[u8], source: SocketAddr) -> Result<()> {
        let event = match siphon_sip_core::parse_message(bytes) {
            Ok(message) => TransportEvent::MessageReceived {
                message,
                source,
                destination: self.inner.local_addr,
            },
            Err(e) => TransportEvent::Error {
                error: format!("unparseable message from {}: {}", source, e),
            },
        };
        self.inner
            .events_tx
            .send(event)
            .await
            .map_err(|_| Error::TransportClosed)
    }

    /// Make every following send fail (or succeed again)
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::Release);
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.inner.sent.lock().clone()
    }

    /// Number of messages sent so far
    pub fn sent_count(&self) -> usize {
        self.inner.sent.lock().len()
    }

    /// Drain the record of sent messages
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.inner.sent.lock())
    }

    /// Wait until at least `count` messages have been sent
    pub async fn wait_for_sent(&self, count: usize) {
        loop {
            let notified = self.inner.sent_signal.notified();
            if self.sent_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr)
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        if self.inner.fail_sends.load(Ordering::Acquire) {
            return Err(Error::SendFailed {
                destination,
                reason: "simulated failure".to_string(),
            });
        }
        tracing::trace!("Recording {} to {}", message.start_line(), destination);
        self.inner.sent.lock().push(SentMessage {
            message,
            destination,
        });
        self.inner.sent_signal.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            let _ = self.inner.events_tx.send(TransportEvent::Closed).await;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryTransport({})", self.inner.local_addr)
    }
}
