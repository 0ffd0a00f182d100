use std::fmt;

use crate::message::{MessageCore, SipMessage};
use crate::types::StatusCode;

/// SIP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    core: MessageCore,
}

impl Response {
    /// Response without headers; usually built with `Request::create_response`
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            core: MessageCore::new(),
        }
    }

    pub(crate) fn from_parts(status: StatusCode, reason: Option<String>, core: MessageCore) -> Self {
        Self {
            status,
            reason,
            core,
        }
    }

    /// Status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase: the custom one if set, otherwise the canonical phrase
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.reason_phrase())
    }

    /// Builder-style custom reason phrase
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl SipMessage for Response {
    fn core(&self) -> &MessageCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MessageCore {
        &mut self.core
    }

    fn start_line(&self) -> String {
        format!("SIP/2.0 {} {}", self.status.as_u16(), self.reason_phrase())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        let resp = Response::new(StatusCode::BusyHere);
        assert_eq!(resp.start_line(), "SIP/2.0 486 Busy Here");
        let resp = Response::new(StatusCode::Other(499)).with_reason("Custom");
        assert_eq!(resp.start_line(), "SIP/2.0 499 Custom");
        assert_eq!(resp.to_string(), "SIP/2.0 499 Custom\r\nContent-Length: 0\r\n\r\n");
    }
}
