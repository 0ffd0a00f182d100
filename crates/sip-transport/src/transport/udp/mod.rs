use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use siphon_sip_core::{Message, SipMessage};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent};

/// Event channel capacity when the caller gives none
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// SIP over UDP, one datagram per message
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    socket: UdpSocket,
    local_addr: SocketAddr,
    closed: AtomicBool,
    shutdown: Notify,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl UdpTransport {
    /// Bind `addr` and start receiving. Parsed messages, parse failures and
    /// the final `Closed` arrive on the returned receiver.
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::BindFailed { addr, source })?;
        let local_addr = socket.local_addr()?;
        info!(local_addr = %local_addr, "UDP transport listening");

        let inner = Arc::new(UdpTransportInner {
            socket,
            local_addr,
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            events_tx,
        });
        tokio::spawn(receive_loop(inner.clone()));

        Ok((UdpTransport { inner }, events_rx))
    }
}

/// Read datagrams until the transport is closed or nobody listens any more
async fn receive_loop(inner: Arc<UdpTransportInner>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    while !inner.closed.load(Ordering::Acquire) {
        let received = tokio::select! {
            _ = inner.shutdown.notified() => break,
            received = inner.socket.recv_from(&mut buf) => received,
        };

        let event = match received {
            Ok((len, source)) => match decode_datagram(&buf[..len], source, inner.local_addr) {
                Some(event) => event,
                None => continue,
            },
            Err(_) if inner.closed.load(Ordering::Acquire) => break,
            Err(e) => {
                error!(error = %e, "UDP receive failed");
                TransportEvent::Error {
                    error: format!("receive failed: {}", e),
                }
            }
        };

        if inner.events_tx.send(event).await.is_err() {
            debug!("No event receiver left");
            break;
        }
    }

    let _ = inner.events_tx.send(TransportEvent::Closed).await;
    debug!(local_addr = %inner.local_addr, "UDP receive loop stopped");
}

/// Turn one datagram into an event; `None` for keep-alives
fn decode_datagram(packet: &[u8], source: SocketAddr, local_addr: SocketAddr) -> Option<TransportEvent> {
    // CRLF keep-alives (RFC 5626 §4.4.1)
    if packet.iter().all(|b| matches!(b, b'\r' | b'\n')) {
        trace!(source = %source, "Keep-alive");
        return None;
    }
    trace!(source = %source, len = packet.len(), "Datagram received");

    Some(match siphon_sip_core::parse_message(packet) {
        Ok(message) => TransportEvent::MessageReceived {
            message,
            source,
            destination: local_addr,
        },
        Err(e) => {
            warn!(source = %source, error = %e, "Discarding unparseable datagram");
            TransportEvent::Error {
                error: format!("unparseable datagram from {}: {}", source, e),
            }
        }
    })
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr)
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let bytes = message.to_bytes();
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::MessageTooLarge(bytes.len()));
        }

        trace!(destination = %destination, len = bytes.len(), start_line = %message.start_line(), "Sending");

        let sent = self
            .inner
            .socket
            .send_to(&bytes, destination)
            .await
            .map_err(|e| Error::SendFailed {
                destination,
                reason: e.to_string(),
            })?;
        if sent != bytes.len() {
            return Err(Error::SendFailed {
                destination,
                reason: format!("short write: {} of {} bytes", sent, bytes.len()),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            // permit is stored if the loop is not parked in select! right now
            self.inner.shutdown.notify_one();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UdpTransport({})", self.inner.local_addr)
    }
}
