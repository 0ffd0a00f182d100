//! # SIP Messages
//!
//! [`Request`] and [`Response`] share a [`MessageCore`] holding the ordered headers,
//! the body and the commit flag. The [`SipMessage`] trait exposes the common
//! surface (typed accessors for the dialog and transaction identifying headers,
//! serialization) over both, and [`Message`] wraps either one.
//!
//! ## Mutation rules
//!
//! - Once [`MessageCore::commit`] has been called (the message was handed to a
//!   transport), every mutator returns [`Error::Committed`].
//! - The application-facing mutators [`MessageCore::add_header`],
//!   [`MessageCore::set_header`] and [`MessageCore::remove_header`] additionally
//!   refuse system headers (Via, From, To, Call-ID, CSeq, Route, Record-Route,
//!   RAck, RSeq). The stack edits those through [`MessageCore::headers_mut`].
//!
//! ## Serialization
//!
//! [`SipMessage::to_bytes`] writes the start line, every header using the
//! registry's precomputed `"Name: "` bytes, a Content-Length computed from the
//! body (any stored Content-Length header is ignored), a blank line and the body.

mod request;
mod response;

use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::header::{HeaderName, HeaderValue, Headers, SipHeader};
use crate::types::{Address, CSeq, Via};

pub use request::{Request, RequestBuilder};
pub use response::Response;

/// Headers, body and commit state shared by requests and responses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageCore {
    headers: Headers,
    body: Bytes,
    committed: bool,
}

impl MessageCore {
    /// Empty, uncommitted message content
    pub fn new() -> Self {
        Self::default()
    }

    /// Content assembled by the parser or the stack
    pub fn with_parts(headers: Headers, body: Bytes) -> Self {
        Self {
            headers,
            body,
            committed: false,
        }
    }

    /// Read-only headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Stack-level header access; only the commit state is checked
    pub fn headers_mut(&mut self) -> Result<&mut Headers> {
        self.check_uncommitted()?;
        Ok(&mut self.headers)
    }

    /// Body bytes
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replace the body
    pub fn set_body(&mut self, body: impl Into<Bytes>) -> Result<()> {
        self.check_uncommitted()?;
        self.body = body.into();
        Ok(())
    }

    /// Whether the message has been committed
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Freeze the message. Idempotent.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    /// Append a header value on behalf of an application
    pub fn add_header(&mut self, name: impl Into<HeaderName>, value: &str) -> Result<()> {
        let name = self.check_app_mutation(name.into())?;
        let value = HeaderValue::parse(&name, value)?;
        self.headers.push(name, value);
        Ok(())
    }

    /// Replace all values of a header on behalf of an application
    pub fn set_header(&mut self, name: impl Into<HeaderName>, value: &str) -> Result<()> {
        let name = self.check_app_mutation(name.into())?;
        let value = HeaderValue::parse(&name, value)?;
        self.headers.set(name, value);
        Ok(())
    }

    /// Remove all values of a header on behalf of an application
    pub fn remove_header(&mut self, name: impl Into<HeaderName>) -> Result<usize> {
        let name = self.check_app_mutation(name.into())?;
        Ok(self.headers.remove_all(name))
    }

    /// Call-ID
    pub fn call_id(&self) -> Option<&str> {
        self.headers.get(SipHeader::CallId).and_then(HeaderValue::as_text)
    }

    /// Parsed CSeq
    pub fn cseq(&self) -> Option<CSeq> {
        self.headers
            .get(SipHeader::CSeq)
            .and_then(HeaderValue::as_text)
            .and_then(|s| s.parse().ok())
    }

    /// From address
    pub fn from(&self) -> Option<&Address> {
        self.headers.get(SipHeader::From).and_then(HeaderValue::as_address)
    }

    /// To address
    pub fn to(&self) -> Option<&Address> {
        self.headers.get(SipHeader::To).and_then(HeaderValue::as_address)
    }

    /// `tag` of the From header
    pub fn from_tag(&self) -> Option<&str> {
        self.from().and_then(Address::tag)
    }

    /// `tag` of the To header
    pub fn to_tag(&self) -> Option<&str> {
        self.to().and_then(Address::tag)
    }

    /// Set the `tag` of the To header
    pub fn set_to_tag(&mut self, tag: &str) -> Result<()> {
        self.check_uncommitted()?;
        let to = self
            .headers
            .get_mut(SipHeader::To)
            .and_then(HeaderValue::as_address_mut)
            .ok_or(Error::MissingHeader("To"))?;
        to.set_tag(tag);
        Ok(())
    }

    /// Topmost Via
    pub fn top_via(&self) -> Option<&Via> {
        self.headers.get(SipHeader::Via).and_then(HeaderValue::as_via)
    }

    /// All Via hops, topmost first
    pub fn vias(&self) -> impl Iterator<Item = &Via> {
        self.headers.get_all(SipHeader::Via).filter_map(HeaderValue::as_via)
    }

    /// Branch of the topmost Via
    pub fn branch(&self) -> Option<&str> {
        self.top_via().and_then(Via::branch)
    }

    fn check_uncommitted(&self) -> Result<()> {
        if self.committed {
            Err(Error::Committed)
        } else {
            Ok(())
        }
    }

    fn check_app_mutation(&self, name: HeaderName) -> Result<HeaderName> {
        self.check_uncommitted()?;
        if name.is_system() {
            return Err(Error::SystemHeader(name.as_str().to_string()));
        }
        Ok(name)
    }

    fn write_to(&self, start_line: &str, buf: &mut BytesMut) {
        buf.reserve(start_line.len() + self.headers.len() * 32 + self.body.len() + 32);
        buf.put_slice(start_line.as_bytes());
        buf.put_slice(b"\r\n");

        for field in self.headers.iter() {
            match field.name.known() {
                Some(SipHeader::ContentLength) => continue,
                Some(header) => buf.put_slice(header.bytes_colon_space()),
                None => {
                    buf.put_slice(field.name.as_str().as_bytes());
                    buf.put_slice(b": ");
                }
            }
            // Writing into BytesMut cannot fail
            let _ = write!(buf, "{}", field.value);
            buf.put_slice(b"\r\n");
        }

        buf.put_slice(SipHeader::ContentLength.bytes_colon_space());
        let _ = write!(buf, "{}", self.body.len());
        buf.put_slice(b"\r\n\r\n");
        buf.put_slice(&self.body);
    }
}

/// Surface shared by requests and responses
pub trait SipMessage {
    /// Shared content
    fn core(&self) -> &MessageCore;

    /// Mutable shared content
    fn core_mut(&mut self) -> &mut MessageCore;

    /// Request-Line or Status-Line, without CRLF
    fn start_line(&self) -> String;

    /// Headers
    fn headers(&self) -> &Headers {
        self.core().headers()
    }

    /// Call-ID
    fn call_id(&self) -> Option<&str> {
        self.core().call_id()
    }

    /// Parsed CSeq
    fn cseq(&self) -> Option<CSeq> {
        self.core().cseq()
    }

    /// From address
    fn from_address(&self) -> Option<&Address> {
        self.core().from()
    }

    /// To address
    fn to_address(&self) -> Option<&Address> {
        self.core().to()
    }

    /// `tag` of the From header
    fn from_tag(&self) -> Option<&str> {
        self.core().from_tag()
    }

    /// `tag` of the To header
    fn to_tag(&self) -> Option<&str> {
        self.core().to_tag()
    }

    /// Topmost Via
    fn top_via(&self) -> Option<&Via> {
        self.core().top_via()
    }

    /// Branch of the topmost Via
    fn branch(&self) -> Option<&str> {
        self.core().branch()
    }

    /// Body bytes
    fn body(&self) -> &Bytes {
        self.core().body()
    }

    /// Whether the message has been committed
    fn is_committed(&self) -> bool {
        self.core().is_committed()
    }

    /// Freeze the message
    fn commit(&mut self) {
        self.core_mut().commit()
    }

    /// Wire representation
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.core().write_to(&self.start_line(), &mut buf);
        buf.freeze()
    }
}

/// A request or a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Request
    Request(Request),
    /// Response
    Response(Response),
}

impl Message {
    /// Whether this is a request
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    /// Request view
    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(r) => Some(r),
            Message::Response(_) => None,
        }
    }

    /// Response view
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(r) => Some(r),
            Message::Request(_) => None,
        }
    }

    /// Take the request out
    pub fn into_request(self) -> Option<Request> {
        match self {
            Message::Request(r) => Some(r),
            Message::Response(_) => None,
        }
    }

    /// Take the response out
    pub fn into_response(self) -> Option<Response> {
        match self {
            Message::Response(r) => Some(r),
            Message::Request(_) => None,
        }
    }
}

impl SipMessage for Message {
    fn core(&self) -> &MessageCore {
        match self {
            Message::Request(r) => r.core(),
            Message::Response(r) => r.core(),
        }
    }

    fn core_mut(&mut self) -> &mut MessageCore {
        match self {
            Message::Request(r) => r.core_mut(),
            Message::Response(r) => r.core_mut(),
        }
    }

    fn start_line(&self) -> String {
        match self {
            Message::Request(r) => r.start_line(),
            Message::Response(r) => r.start_line(),
        }
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Message::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Message::Response(r)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}
