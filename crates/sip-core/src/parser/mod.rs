//! # SIP Wire Parser
//!
//! Turns one datagram (or one framed stream message) into a [`Message`].
//!
//! ```text
//! start-line CRLF
//! *( message-header CRLF )
//! CRLF
//! [ message-body ]
//! ```
//!
//! - Leading empty lines (keep-alive CRLFs) are skipped, and bare LF line endings
//!   are accepted.
//! - Folded header lines (continuations starting with SP or HT) are joined with
//!   a single space.
//! - Registered header names are recognized with [`registry::lookahead`], which
//!   does not allocate. Single-letter compact forms are expanded.
//! - Via, Route, Record-Route, Contact and the other list headers are split on
//!   commas outside quotes and angle brackets.
//! - Via, From, To, Call-ID and CSeq are mandatory. A request's CSeq method must
//!   equal its method.
//! - The body is framed by Content-Length. Without it the rest of the input is
//!   the body. A Content-Length larger than the remaining bytes is an error.
//!
//! Any violation yields [`Error::ParseError`], [`Error::InvalidHeader`] or
//! [`Error::MissingHeader`]; nothing partially parsed escapes.

mod start_line;

use bytes::Bytes;
use tracing::trace;

use crate::error::{Error, Result};
use crate::header::registry::{self, SipHeader};
use crate::header::{HeaderName, HeaderValue, Headers};
use crate::message::{Message, MessageCore, Request, Response};
use crate::types::param::split_unquoted;
use crate::types::{CSeq, Method, StatusCode, Uri};

use start_line::{parse_start_line, StartLine};

/// Parse a complete SIP message
pub fn parse_message(data: &[u8]) -> Result<Message> {
    let (head, body) = split_head(data)?;
    let mut lines = unfold(head).into_iter();

    let first = lines
        .next()
        .ok_or_else(|| Error::ParseError("empty message".to_string()))?;
    let start = parse_start_line(&first).ok_or_else(|| {
        Error::ParseError(format!(
            "malformed start line '{}'",
            String::from_utf8_lossy(&first)
        ))
    })?;

    let mut headers = Headers::new();
    let mut content_length = None;
    for line in lines {
        let (name, value) = split_header_line(&line)?;
        if name.is(SipHeader::ContentLength) {
            let len = value.trim().parse::<usize>().map_err(|_| {
                Error::invalid_header("Content-Length", format!("not a number: '{}'", value))
            })?;
            content_length = Some(len);
            continue;
        }
        push_values(&mut headers, name, value)?;
    }

    let body = match content_length {
        Some(len) if len > body.len() => {
            return Err(Error::ParseError(format!(
                "Content-Length {} exceeds the {} available body bytes",
                len,
                body.len()
            )))
        }
        Some(len) => Bytes::copy_from_slice(&body[..len]),
        None => Bytes::copy_from_slice(body),
    };

    let core = MessageCore::with_parts(headers, body);
    let cseq = validate_mandatory(&core)?;

    let message = match start {
        StartLine::Request { method, uri } => {
            let method: Method = method.parse()?;
            if cseq.method != method {
                return Err(Error::invalid_header(
                    "CSeq",
                    format!("method {} does not match request method {}", cseq.method, method),
                ));
            }
            let uri: Uri = uri.parse()?;
            Message::Request(Request::from_parts(method, uri, core))
        }
        StartLine::Status { code, reason } => {
            let status = StatusCode::from_u16(code)?;
            let reason = (!reason.is_empty() && reason != status.reason_phrase())
                .then(|| reason.to_string());
            Message::Response(Response::from_parts(status, reason, core))
        }
    };

    trace!(bytes = data.len(), "parsed SIP message");
    Ok(message)
}

/// Separate the header block from the body at the first empty line
fn split_head(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let mut start = 0;
    while data[start..].starts_with(b"\r\n") {
        start += 2;
    }
    while data[start..].starts_with(b"\n") {
        start += 1;
    }
    let data = &data[start..];

    let mut i = 0;
    while let Some(offset) = data[i..].iter().position(|&b| b == b'\n') {
        let nl = i + offset;
        let next = &data[nl + 1..];
        if next.starts_with(b"\r\n") {
            return Ok((&data[..nl + 1], &next[2..]));
        }
        if next.starts_with(b"\n") {
            return Ok((&data[..nl + 1], &next[1..]));
        }
        i = nl + 1;
    }
    Err(Error::ParseError("missing empty line after headers".to_string()))
}

/// Split into logical lines, joining folded continuations
fn unfold(head: &[u8]) -> Vec<Vec<u8>> {
    let mut lines: Vec<Vec<u8>> = Vec::new();
    for raw in head.split(|&b| b == b'\n') {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            continue;
        }
        if raw[0] == b' ' || raw[0] == b'\t' {
            if let Some(prev) = lines.last_mut() {
                prev.push(b' ');
                prev.extend_from_slice(trim_start(raw));
                continue;
            }
        }
        lines.push(raw.to_vec());
    }
    lines
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let skip = bytes
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    &bytes[skip..]
}

fn split_header_line(line: &[u8]) -> Result<(HeaderName, &str)> {
    let malformed = || {
        Error::ParseError(format!(
            "malformed header line '{}'",
            String::from_utf8_lossy(line)
        ))
    };

    let (name, name_end) = match registry::lookahead(line) {
        Some((header, len)) => (HeaderName::Known(header), len),
        None => {
            let end = line
                .iter()
                .position(|&b| b == b':' || b == b' ' || b == b'\t')
                .ok_or_else(malformed)?;
            let text = std::str::from_utf8(&line[..end]).map_err(|_| malformed())?;
            (text.parse::<HeaderName>()?, end)
        }
    };

    let rest = trim_start(&line[name_end..]);
    let value = rest.strip_prefix(b":").ok_or_else(malformed)?;
    let value = std::str::from_utf8(value)
        .map_err(|_| Error::invalid_header(name.as_str(), "value is not UTF-8"))?;
    Ok((name, value.trim()))
}

fn push_values(headers: &mut Headers, name: HeaderName, value: &str) -> Result<()> {
    let is_list = name.known().is_some_and(SipHeader::is_list);
    if is_list {
        for part in split_unquoted(value, ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let decoded = HeaderValue::parse(&name, part)?;
            headers.push(name.clone(), decoded);
        }
    } else {
        let decoded = HeaderValue::parse(&name, value)?;
        headers.push(name, decoded);
    }
    Ok(())
}

fn validate_mandatory(core: &MessageCore) -> Result<CSeq> {
    if core.top_via().is_none() {
        return Err(Error::MissingHeader("Via"));
    }
    if core.from().is_none() {
        return Err(Error::MissingHeader("From"));
    }
    if core.to().is_none() {
        return Err(Error::MissingHeader("To"));
    }
    match core.call_id() {
        Some(id) if !id.is_empty() => {}
        _ => return Err(Error::MissingHeader("Call-ID")),
    }
    let raw = core
        .headers()
        .get(SipHeader::CSeq)
        .and_then(HeaderValue::as_text)
        .ok_or(Error::MissingHeader("CSeq"))?;
    raw.parse()
}
