//! # SIP Status Codes
//!
//! Status codes as defined in
//! [RFC 3261 Section 21](https://datatracker.ietf.org/doc/html/rfc3261#section-21),
//! with their canonical reason phrases.
//!
//! - `1xx`: Provisional
//! - `2xx`: Success
//! - `3xx`: Redirection
//! - `4xx`: Client Error
//! - `5xx`: Server Error
//! - `6xx`: Global Failure
//!
//! ```rust
//! use siphon_sip_core::types::StatusCode;
//!
//! let status = StatusCode::from_u16(481).unwrap();
//! assert_eq!(status, StatusCode::CallOrTransactionDoesNotExist);
//! assert_eq!(status.reason_phrase(), "Call/Transaction Does Not Exist");
//! assert!(status.is_client_error());
//!
//! let custom = StatusCode::from_u16(599).unwrap();
//! assert_eq!(custom, StatusCode::Other(599));
//! assert!(StatusCode::from_u16(700).is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

macro_rules! status_codes {
    ( $( $variant:ident = $code:literal, $reason:literal; )* ) => {
        /// SIP response status code
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum StatusCode {
            $(
                #[doc = concat!(stringify!($code), " ", $reason)]
                $variant,
            )*
            /// Any other code in 100..=699
            Other(u16),
        }

        impl StatusCode {
            /// Status code for a raw value; codes outside 100..=699 are rejected
            pub fn from_u16(code: u16) -> Result<Self> {
                match code {
                    $( $code => Ok(StatusCode::$variant), )*
                    100..=699 => Ok(StatusCode::Other(code)),
                    _ => Err(Error::InvalidStatusCode(code)),
                }
            }

            /// Numeric value
            pub fn as_u16(&self) -> u16 {
                match self {
                    $( StatusCode::$variant => $code, )*
                    StatusCode::Other(code) => *code,
                }
            }

            /// Canonical reason phrase, `"Unknown"` for unregistered codes
            pub fn reason_phrase(&self) -> &'static str {
                match self {
                    $( StatusCode::$variant => $reason, )*
                    StatusCode::Other(_) => "Unknown",
                }
            }
        }
    };
}

status_codes! {
    Trying = 100, "Trying";
    Ringing = 180, "Ringing";
    CallIsBeingForwarded = 181, "Call Is Being Forwarded";
    Queued = 182, "Queued";
    SessionProgress = 183, "Session Progress";

    Ok = 200, "OK";
    Accepted = 202, "Accepted";

    MultipleChoices = 300, "Multiple Choices";
    MovedPermanently = 301, "Moved Permanently";
    MovedTemporarily = 302, "Moved Temporarily";
    UseProxy = 305, "Use Proxy";
    AlternativeService = 380, "Alternative Service";

    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    PaymentRequired = 402, "Payment Required";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    NotAcceptable = 406, "Not Acceptable";
    ProxyAuthenticationRequired = 407, "Proxy Authentication Required";
    RequestTimeout = 408, "Request Timeout";
    Gone = 410, "Gone";
    RequestEntityTooLarge = 413, "Request Entity Too Large";
    RequestUriTooLong = 414, "Request-URI Too Long";
    UnsupportedMediaType = 415, "Unsupported Media Type";
    UnsupportedUriScheme = 416, "Unsupported URI Scheme";
    BadExtension = 420, "Bad Extension";
    ExtensionRequired = 421, "Extension Required";
    IntervalTooBrief = 423, "Interval Too Brief";
    TemporarilyUnavailable = 480, "Temporarily Unavailable";
    CallOrTransactionDoesNotExist = 481, "Call/Transaction Does Not Exist";
    LoopDetected = 482, "Loop Detected";
    TooManyHops = 483, "Too Many Hops";
    AddressIncomplete = 484, "Address Incomplete";
    Ambiguous = 485, "Ambiguous";
    BusyHere = 486, "Busy Here";
    RequestTerminated = 487, "Request Terminated";
    NotAcceptableHere = 488, "Not Acceptable Here";
    RequestPending = 491, "Request Pending";
    Undecipherable = 493, "Undecipherable";

    ServerInternalError = 500, "Server Internal Error";
    NotImplemented = 501, "Not Implemented";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
    ServerTimeout = 504, "Server Time-out";
    VersionNotSupported = 505, "Version Not Supported";
    MessageTooLarge = 513, "Message Too Large";

    BusyEverywhere = 600, "Busy Everywhere";
    Decline = 603, "Decline";
    DoesNotExistAnywhere = 604, "Does Not Exist Anywhere";
    NotAcceptableAnywhere = 606, "Not Acceptable";
}

impl StatusCode {
    /// 1xx
    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.as_u16())
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// 3xx
    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.as_u16())
    }

    /// 4xx
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// 5xx
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }

    /// 6xx
    pub fn is_global_failure(&self) -> bool {
        (600..700).contains(&self.as_u16())
    }

    /// Any final response (2xx-6xx)
    pub fn is_final(&self) -> bool {
        self.as_u16() >= 200
    }

    /// 3xx-6xx
    pub fn is_error(&self) -> bool {
        self.as_u16() >= 300
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

impl FromStr for StatusCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code: u16 = s
            .trim()
            .parse()
            .map_err(|_| Error::ParseError(format!("invalid status code '{}'", s)))?;
        StatusCode::from_u16(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_known_codes() {
        for code in [100u16, 180, 200, 481, 486, 487, 503, 606] {
            assert_eq!(StatusCode::from_u16(code).unwrap().as_u16(), code);
        }
    }

    #[test]
    fn test_classes() {
        assert!(StatusCode::Trying.is_provisional());
        assert!(!StatusCode::Trying.is_final());
        assert!(StatusCode::Ok.is_success());
        assert!(StatusCode::Ok.is_final());
        assert!(!StatusCode::Ok.is_error());
        assert!(StatusCode::MovedTemporarily.is_redirection());
        assert!(StatusCode::BusyHere.is_client_error());
        assert!(StatusCode::ServiceUnavailable.is_server_error());
        assert!(StatusCode::Decline.is_global_failure());
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(StatusCode::Ok.to_string(), "200 OK");
        assert_eq!(StatusCode::Other(499).to_string(), "499 Unknown");
        assert_eq!("486".parse::<StatusCode>().unwrap(), StatusCode::BusyHere);
        assert!("99".parse::<StatusCode>().is_err());
        assert!("abc".parse::<StatusCode>().is_err());
    }
}
