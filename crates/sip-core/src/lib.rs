//! SIP message layer for the siphon stack
//!
//! This crate turns bytes into SIP messages and back:
//!
//! - [`header`]: the static header registry (byte-level, allocation-free name
//!   recognition), header names, typed header values and the ordered header multimap
//! - [`types`]: methods, status codes, URIs, addresses, Via and CSeq values
//! - [`message`]: [`Request`], [`Response`] and the [`Message`] wrapper, sharing a
//!   common [`MessageCore`] of headers and body
//! - [`parser`]: RFC 3261 wire parser
//!
//! ```rust
//! use siphon_sip_core::prelude::*;
//!
//! let raw = b"OPTIONS sip:bob@example.com SIP/2.0\r\n\
//! Via: SIP/2.0/UDP pc33.example.com;branch=z9hG4bK776asdhds\r\n\
//! From: <sip:alice@example.com>;tag=1928301774\r\n\
//! To: <sip:bob@example.com>\r\n\
//! Call-ID: a84b4c76e66710\r\n\
//! CSeq: 1 OPTIONS\r\n\
//! Content-Length: 0\r\n\r\n";
//!
//! let message = parse_message(raw).unwrap();
//! let request = message.as_request().unwrap();
//! assert_eq!(request.method(), &Method::Options);
//! assert_eq!(request.branch(), Some("z9hG4bK776asdhds"));
//! ```

pub mod error;
pub mod header;
pub mod message;
pub mod parser;
pub mod types;
pub mod util;

pub use error::{Error, Result};
pub use header::{HeaderField, HeaderKind, HeaderName, HeaderValue, Headers, SipHeader};
pub use message::{Message, MessageCore, Request, Response, SipMessage};
pub use parser::parse_message;
pub use types::{Address, CSeq, Method, Params, StatusCode, Uri, Via};
pub use util::{generate_branch, generate_call_id, generate_tag, MAGIC_COOKIE};

/// Commonly used items
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::header::{registry, HeaderKind, HeaderName, HeaderValue, Headers, SipHeader};
    pub use crate::message::{Message, Request, Response, SipMessage};
    pub use crate::parser::parse_message;
    pub use crate::types::{Address, CSeq, Method, Params, StatusCode, Uri, Via};
    pub use crate::util::{generate_branch, generate_tag, MAGIC_COOKIE};
}
