//! Error types for dialog-core
//!
//! [`DialogError`] keeps the failure classes of the signaling core apart:
//!
//! - wire-level problems ([`DialogError::Protocol`]) are rejected before a
//!   transaction exists,
//! - matching failures ([`DialogError::TransactionNotFound`],
//!   [`DialogError::SessionNotFound`]) become "481 Call/Transaction Does Not Exist",
//! - timer exhaustion is reported as [`DialogError::Timeout`],
//! - misuse of the API ([`DialogError::IllegalState`]) is a programming error and
//!   is always returned to the caller,
//! - full tables yield [`DialogError::ResourceExhausted`], shed with a 503.

use thiserror::Error;

use siphon_sip_core::StatusCode;

/// Result alias for dialog-core operations
pub type DialogResult<T> = Result<T, DialogError>;

/// Errors raised by the transaction, session and dispatch layers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogError {
    /// Malformed or semantically invalid SIP input
    #[error("Protocol error: {message}")]
    Protocol {
        /// What was wrong with the message
        message: String,
    },

    /// No transaction matches the message
    #[error("Transaction not found: {key}")]
    TransactionNotFound {
        /// Key that was looked up
        key: String,
    },

    /// No application session or no session within it matches the request
    #[error("Session not found: {id}")]
    SessionNotFound {
        /// Application id or dialog key that was looked up
        id: String,
    },

    /// A request's CSeq is lower than the last one seen in its dialog
    #[error("CSeq {received} is lower than the last remote CSeq {last} in dialog {call_id}")]
    CSeqOutOfOrder {
        /// Call-ID of the dialog
        call_id: String,
        /// CSeq carried by the request
        received: u32,
        /// Highest CSeq seen so far
        last: u32,
    },

    /// A transaction timer expired (B, F or H)
    #[error("Transaction {key} timed out (Timer {timer})")]
    Timeout {
        /// Transaction key
        key: String,
        /// Timer that fired
        timer: String,
    },

    /// The operation is not allowed in the current state
    #[error("Illegal state: {message}")]
    IllegalState {
        /// Description of the violation
        message: String,
    },

    /// A bounded table is full
    #[error("Resource exhausted: {resource} (limit {limit})")]
    ResourceExhausted {
        /// Which table
        resource: String,
        /// Configured capacity
        limit: usize,
    },

    /// Sending a message failed
    #[error("Transport error: {message}")]
    Transport {
        /// Underlying failure
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong
        message: String,
    },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    Internal {
        /// Description
        message: String,
    },
}

impl DialogError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    /// Create an illegal state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState { message: message.into() }
    }

    /// Create a session not found error
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Response code that reports this error to the peer
    pub fn status_code(&self) -> StatusCode {
        match self {
            DialogError::Protocol { .. } => StatusCode::BadRequest,
            DialogError::TransactionNotFound { .. } | DialogError::SessionNotFound { .. } => {
                StatusCode::CallOrTransactionDoesNotExist
            }
            DialogError::ResourceExhausted { .. } => StatusCode::ServiceUnavailable,
            DialogError::Timeout { .. } => StatusCode::RequestTimeout,
            DialogError::CSeqOutOfOrder { .. }
            | DialogError::IllegalState { .. }
            | DialogError::Transport { .. }
            | DialogError::Config { .. }
            | DialogError::Internal { .. } => StatusCode::ServerInternalError,
        }
    }

    /// Whether this error signals misuse of the API rather than a wire condition
    pub fn is_programming_error(&self) -> bool {
        matches!(self, DialogError::IllegalState { .. })
    }
}

impl From<siphon_sip_core::Error> for DialogError {
    fn from(e: siphon_sip_core::Error) -> Self {
        match e {
            siphon_sip_core::Error::Committed
            | siphon_sip_core::Error::SystemHeader(_)
            | siphon_sip_core::Error::IllegalState(_) => DialogError::illegal_state(e.to_string()),
            other => DialogError::protocol(other.to_string()),
        }
    }
}

impl From<siphon_sip_transport::Error> for DialogError {
    fn from(e: siphon_sip_transport::Error) -> Self {
        DialogError::Transport { message: e.to_string() }
    }
}

impl From<siphon_infra_common::Error> for DialogError {
    fn from(e: siphon_infra_common::Error) -> Self {
        DialogError::Config { message: e.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            DialogError::session_not_found("abc").status_code(),
            StatusCode::CallOrTransactionDoesNotExist
        );
        assert_eq!(
            DialogError::ResourceExhausted { resource: "transactions".into(), limit: 1 }.status_code(),
            StatusCode::ServiceUnavailable
        );
        assert_eq!(
            DialogError::CSeqOutOfOrder { call_id: "c".into(), received: 1, last: 2 }.status_code(),
            StatusCode::ServerInternalError
        );
        assert_eq!(DialogError::protocol("x").status_code(), StatusCode::BadRequest);
    }

    #[test]
    fn test_sip_core_conversion() {
        let err: DialogError = siphon_sip_core::Error::Committed.into();
        assert!(err.is_programming_error());
        let err: DialogError = siphon_sip_core::Error::MissingHeader("Via").into();
        assert!(matches!(err, DialogError::Protocol { .. }));
    }
}
