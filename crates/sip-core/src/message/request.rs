use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::header::{HeaderName, HeaderValue, Headers, SipHeader};
use crate::message::{MessageCore, Response, SipMessage};
use crate::types::{Method, StatusCode, Uri};

/// SIP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    uri: Uri,
    core: MessageCore,
}

impl Request {
    /// Request without headers or body
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            core: MessageCore::new(),
        }
    }

    /// Start building a request
    pub fn builder(method: Method, uri: Uri) -> RequestBuilder {
        RequestBuilder {
            request: Request::new(method, uri),
        }
    }

    pub(crate) fn from_parts(method: Method, uri: Uri, core: MessageCore) -> Self {
        Self { method, uri, core }
    }

    /// Method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request-URI
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Replace the Request-URI
    pub fn set_uri(&mut self, uri: Uri) -> Result<()> {
        if self.core.is_committed() {
            return Err(Error::Committed);
        }
        self.uri = uri;
        Ok(())
    }

    /// An initial request carries no To tag and is not a CANCEL
    pub fn is_initial(&self) -> bool {
        self.core.to_tag().is_none() && self.method != Method::Cancel
    }

    /// Build a response per RFC 3261 §8.2.6.2.
    ///
    /// Via, From, To, Call-ID and CSeq are copied. Record-Route is copied on
    /// 101-299 responses to dialog-creating requests (§12.1.1). ACK never gets a
    /// response, so asking for one is an error.
    pub fn create_response(&self, status: StatusCode) -> Result<Response> {
        if self.method == Method::Ack {
            return Err(Error::IllegalState("cannot create a response to ACK".to_string()));
        }

        let dialog_forming = self.method.creates_dialog()
            && status.as_u16() > 100
            && status.as_u16() < 300;
        let mut headers = Headers::new();
        for field in self.core.headers() {
            let copy = match field.name.known() {
                Some(
                    SipHeader::Via
                    | SipHeader::From
                    | SipHeader::To
                    | SipHeader::CallId
                    | SipHeader::CSeq,
                ) => true,
                Some(SipHeader::RecordRoute) => dialog_forming,
                _ => false,
            };
            if copy {
                headers.push(field.name.clone(), field.value.clone());
            }
        }

        Ok(Response::from_parts(
            status,
            None,
            MessageCore::with_parts(headers, Bytes::new()),
        ))
    }
}

impl SipMessage for Request {
    fn core(&self) -> &MessageCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MessageCore {
        &mut self.core
    }

    fn start_line(&self) -> String {
        format!("{} {} SIP/2.0", self.method, self.uri)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

/// Builder for outgoing requests
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Append a header
    pub fn header(mut self, name: impl Into<HeaderName>, value: impl Into<HeaderValue>) -> Self {
        self.request.core.headers.push(name, value);
        self
    }

    /// Append a header given as text, decoded according to its registered kind
    pub fn raw_header(self, name: impl Into<HeaderName>, value: &str) -> Result<Self> {
        let name = name.into();
        let value = HeaderValue::parse(&name, value)?;
        Ok(self.header(name, value))
    }

    /// Body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.core.body = body.into();
        self
    }

    /// Finish
    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, Via};

    fn invite() -> Request {
        Request::builder(Method::Invite, "sip:bob@biloxi.com".parse().unwrap())
            .header(SipHeader::Via, Via::new("UDP", "pc33.atlanta.com", None, "z9hG4bK776"))
            .raw_header(SipHeader::From, "<sip:alice@atlanta.com>;tag=1928301774")
            .unwrap()
            .raw_header(SipHeader::To, "<sip:bob@biloxi.com>")
            .unwrap()
            .header(SipHeader::CallId, "a84b4c76e66710")
            .header(SipHeader::CSeq, "314159 INVITE")
            .raw_header(SipHeader::RecordRoute, "<sip:p1.example.com;lr>")
            .unwrap()
            .header("X-App", "1")
            .body("v=0\r\n")
            .build()
    }

    #[test]
    fn test_create_response_copies_dialog_headers() {
        let req = invite();
        let resp = req.create_response(StatusCode::Ringing).unwrap();
        assert_eq!(resp.call_id(), Some("a84b4c76e66710"));
        assert_eq!(resp.branch(), Some("z9hG4bK776"));
        assert_eq!(resp.from_tag(), Some("1928301774"));
        assert!(resp.headers().contains(SipHeader::RecordRoute));
        assert!(!resp.headers().contains("X-App"));
        assert!(resp.body().is_empty());

        let trying = req.create_response(StatusCode::Trying).unwrap();
        assert!(!trying.headers().contains(SipHeader::RecordRoute));
    }

    #[test]
    fn test_no_response_to_ack() {
        let ack = Request::new(Method::Ack, "sip:bob@biloxi.com".parse().unwrap());
        assert!(matches!(
            ack.create_response(StatusCode::Ok),
            Err(Error::IllegalState(_))
        ));
    }

    #[test]
    fn test_system_headers_are_protected() {
        let mut req = invite();
        assert!(matches!(
            req.core_mut().set_header(SipHeader::CallId, "other"),
            Err(Error::SystemHeader(_))
        ));
        assert!(matches!(
            req.core_mut().remove_header("via"),
            Err(Error::SystemHeader(_))
        ));
        req.core_mut().add_header("Subject", "hello").unwrap();
        assert_eq!(
            req.headers().get("Subject").and_then(HeaderValue::as_text),
            Some("hello")
        );
    }

    #[test]
    fn test_commit_freezes_message() {
        let mut req = invite();
        req.commit();
        assert_eq!(req.core_mut().add_header("Subject", "x"), Err(Error::Committed));
        assert!(req.core_mut().headers_mut().is_err());
        assert!(req.core_mut().set_body("x").is_err());
        assert!(req.set_uri("sip:carol@c.com".parse().unwrap()).is_err());
    }

    #[test]
    fn test_serialization() {
        let req = invite();
        let text = req.to_string();
        assert!(text.starts_with("INVITE sip:bob@biloxi.com SIP/2.0\r\nVia: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776\r\n"));
        assert!(text.contains("\r\nFrom: <sip:alice@atlanta.com>;tag=1928301774\r\n"));
        assert!(text.contains("\r\nX-App: 1\r\n"));
        assert!(text.ends_with("Content-Length: 5\r\n\r\nv=0\r\n"));
        let to: Address = "<sip:bob@biloxi.com>".parse().unwrap();
        assert_eq!(req.to_address(), Some(&to));
        assert!(req.is_initial());
    }
}
