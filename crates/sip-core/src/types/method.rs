//! # SIP Methods
//!
//! Request methods from RFC 3261 and the common extensions (PRACK, UPDATE,
//! SUBSCRIBE/NOTIFY, REFER, MESSAGE, PUBLISH, INFO). Anything else is carried as
//! [`Method::Extension`]. Method names are case-sensitive on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// SIP request method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Session establishment
    Invite,
    /// Acknowledges a final response to INVITE
    Ack,
    /// Terminates a dialog
    Bye,
    /// Cancels a pending INVITE
    Cancel,
    /// Capability query
    Options,
    /// Binding registration
    Register,
    /// Mid-dialog information (RFC 6086)
    Info,
    /// Provisional response acknowledgement (RFC 3262)
    Prack,
    /// Session update (RFC 3311)
    Update,
    /// Event subscription (RFC 6665)
    Subscribe,
    /// Event notification (RFC 6665)
    Notify,
    /// Call transfer (RFC 3515)
    Refer,
    /// Instant message (RFC 3428)
    Message,
    /// Event state publication (RFC 3903)
    Publish,
    /// Any other token
    Extension(String),
}

impl Method {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Register => "REGISTER",
            Method::Info => "INFO",
            Method::Prack => "PRACK",
            Method::Update => "UPDATE",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Refer => "REFER",
            Method::Message => "MESSAGE",
            Method::Publish => "PUBLISH",
            Method::Extension(name) => name,
        }
    }

    /// INVITE transactions use their own state machines
    pub fn is_invite(&self) -> bool {
        matches!(self, Method::Invite)
    }

    /// Methods whose 2xx response establishes a dialog
    pub fn creates_dialog(&self) -> bool {
        matches!(self, Method::Invite | Method::Subscribe | Method::Refer)
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let method = match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "OPTIONS" => Method::Options,
            "REGISTER" => Method::Register,
            "INFO" => Method::Info,
            "PRACK" => Method::Prack,
            "UPDATE" => Method::Update,
            "SUBSCRIBE" => Method::Subscribe,
            "NOTIFY" => Method::Notify,
            "REFER" => Method::Refer,
            "MESSAGE" => Method::Message,
            "PUBLISH" => Method::Publish,
            other => {
                if other.is_empty() || !other.bytes().all(is_token_byte) {
                    return Err(Error::ParseError(format!("invalid method '{}'", other)));
                }
                Method::Extension(other.to_string())
            }
        };
        Ok(method)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 3261 `token` character
pub(crate) fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-.!%*_+`'~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_extension_methods() {
        assert_eq!("INVITE".parse::<Method>().unwrap(), Method::Invite);
        assert_eq!("PUBLISH".parse::<Method>().unwrap(), Method::Publish);
        let ext: Method = "FOO".parse().unwrap();
        assert_eq!(ext, Method::Extension("FOO".into()));
        assert_eq!(ext.to_string(), "FOO");
    }

    #[test]
    fn test_methods_are_case_sensitive() {
        assert_eq!(
            "invite".parse::<Method>().unwrap(),
            Method::Extension("invite".into())
        );
        assert!("IN VITE".parse::<Method>().is_err());
        assert!("".parse::<Method>().is_err());
    }
}
