use std::net::SocketAddr;

use thiserror::Error;

/// Result alias for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport failures
#[derive(Error, Debug)]
pub enum Error {
    /// Socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binding the local socket failed
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        source: std::io::Error,
    },

    /// The transport was closed
    #[error("Transport is closed")]
    TransportClosed,

    /// Serialized message does not fit in one datagram
    #[error("Message of {0} bytes exceeds the datagram limit")]
    MessageTooLarge(usize),

    /// Delivery to a peer failed
    #[error("Failed to send to {destination}: {reason}")]
    SendFailed {
        /// Peer address
        destination: SocketAddr,
        /// What went wrong
        reason: String,
    },
}
