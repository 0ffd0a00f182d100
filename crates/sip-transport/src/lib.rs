//! SIP transport layer for the siphon stack
//!
//! Provides the [`Transport`] trait used by the transaction layer, a UDP
//! transport with its own receive loop, and an in-memory transport.

pub mod error;
pub mod transport;

pub use error::{Error, Result};
pub use transport::memory::{MemoryTransport, SentMessage};
pub use transport::udp::UdpTransport;
pub use transport::{Transport, TransportEvent};

/// Bind a UDP transport to the specified address
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        bind_udp, Error, MemoryTransport, Result, SentMessage, Transport, TransportEvent,
        UdpTransport,
    };
}
