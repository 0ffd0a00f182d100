use thiserror::Error;

/// Result alias for SIP message operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing, building or mutating SIP messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed start line, header or body framing
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A header value that does not match the grammar of its kind
    #[error("Invalid {name} header: {reason}")]
    InvalidHeader {
        /// Header name as it appeared on the wire
        name: String,
        /// What was wrong with it
        reason: String,
    },

    /// A header every SIP message must carry is absent
    #[error("Missing mandatory header: {0}")]
    MissingHeader(&'static str),

    /// Status code outside 100..=699
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// Malformed URI
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Mutation attempted after the message was committed
    #[error("Message is committed and can no longer be modified")]
    Committed,

    /// Application-level mutation of a header only the stack may touch
    #[error("{0} is a system header and cannot be modified")]
    SystemHeader(String),

    /// API misuse, e.g. creating a response to an ACK
    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl Error {
    /// Build an [`Error::InvalidHeader`]
    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
