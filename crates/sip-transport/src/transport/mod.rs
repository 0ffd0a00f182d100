//! Transport abstraction shared by the UDP and in-memory transports.

pub mod memory;
pub mod udp;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use siphon_sip_core::Message;

use crate::error::Result;

/// A connectionless SIP transport.
///
/// `send_message` never blocks on anything but the socket itself, so callers
/// holding no locks may await it directly. Received messages are delivered as
/// [`TransportEvent`]s on the channel handed out when the transport is created.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Address the transport is bound to
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Serialize and send `message` to `destination`
    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()>;

    /// Stop receiving and refuse further sends
    async fn close(&self) -> Result<()>;

    /// Whether [`Transport::close`] has been called
    fn is_closed(&self) -> bool;
}

/// Something that happened on a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A message was received and parsed
    MessageReceived {
        /// Parsed message
        message: Message,
        /// Peer address
        source: SocketAddr,
        /// Local address it arrived on
        destination: SocketAddr,
    },

    /// Input was discarded (unparseable datagram, socket error)
    Error {
        /// Diagnostic text
        error: String,
    },

    /// The transport stopped receiving
    Closed,
}
