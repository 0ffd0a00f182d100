//! # Via
//!
//! One Via hop (RFC 3261 §20.42): sent-protocol, sent-by and parameters.
//!
//! ```text
//! Via: SIP/2.0/UDP pc33.atlanta.com:5060;branch=z9hG4bK776asdhds;rport
//! ```
//!
//! The `branch` parameter of the topmost Via identifies the transaction
//! (RFC 3261 §17.1.3 and §17.2.3).
//!
//! ```rust
//! use siphon_sip_core::types::Via;
//!
//! let via: Via = "SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds".parse().unwrap();
//! assert_eq!(via.transport(), "UDP");
//! assert_eq!(via.host(), "pc33.atlanta.com");
//! assert_eq!(via.branch(), Some("z9hG4bK776asdhds"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::param::Params;
use crate::types::uri::parse_host_port;

/// A single Via hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    transport: String,
    host: String,
    port: Option<u16>,
    params: Params,
}

impl Via {
    /// `SIP/2.0/<transport> host[:port];branch=<branch>`
    pub fn new(
        transport: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        branch: impl Into<String>,
    ) -> Self {
        let mut params = Params::new();
        params.set("branch", Some(branch.into()));
        Self {
            transport: transport.into().to_ascii_uppercase(),
            host: host.into(),
            port,
            params,
        }
    }

    /// Transport token (`UDP`, `TCP`, ...), uppercased
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// sent-by host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// sent-by port
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `host[:port]`
    pub fn sent_by(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// `branch` parameter
    pub fn branch(&self) -> Option<&str> {
        self.params.value("branch")
    }

    /// Replace the `branch` parameter
    pub fn set_branch(&mut self, branch: impl Into<String>) {
        self.params.set("branch", Some(branch.into()));
    }

    /// `received` parameter
    pub fn received(&self) -> Option<&str> {
        self.params.value("received")
    }

    /// Set `received`, as a server does when sent-by differs from the packet source
    pub fn set_received(&mut self, received: impl Into<String>) {
        self.params.set("received", Some(received.into()));
    }

    /// Header parameters
    pub fn params(&self) -> &Params {
        &self.params
    }
}

impl FromStr for Via {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |reason: &str| Error::invalid_header("Via", format!("{}: '{}'", reason, s));

        // sent-protocol allows LWS around the slashes
        let mut protocol = Vec::with_capacity(3);
        let mut rest = s;
        for i in 0..3 {
            rest = rest.trim_start();
            let end = if i < 2 {
                rest.find('/').ok_or_else(|| invalid("malformed sent-protocol"))?
            } else {
                rest.find(char::is_whitespace).ok_or_else(|| invalid("missing sent-by"))?
            };
            protocol.push(rest[..end].trim());
            rest = if i < 2 { &rest[end + 1..] } else { &rest[end..] };
        }
        if !protocol[0].eq_ignore_ascii_case("SIP") || protocol[1] != "2.0" {
            return Err(invalid("unsupported protocol"));
        }
        if protocol[2].is_empty() {
            return Err(invalid("empty transport"));
        }

        let rest = rest.trim();
        let (sent_by, params) = match rest.find(';') {
            Some(i) => (&rest[..i], rest[i..].parse::<Params>()?),
            None => (rest, Params::new()),
        };
        let (host, port) = parse_host_port(sent_by).map_err(|e| invalid(e.as_str()))?;

        Ok(Via {
            transport: protocol[2].to_ascii_uppercase(),
            host,
            port,
            params,
        })
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}{}", self.transport, self.sent_by(), self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_port_and_flags() {
        let via: Via = "SIP/2.0/TCP client.atlanta.example.com:5060;branch=z9hG4bK74bf9;rport"
            .parse()
            .unwrap();
        assert_eq!(via.transport(), "TCP");
        assert_eq!(via.port(), Some(5060));
        assert_eq!(via.branch(), Some("z9hG4bK74bf9"));
        assert!(via.params().contains("rport"));
    }

    #[test]
    fn test_parse_tolerates_lws_in_protocol() {
        let via: Via = "SIP / 2.0 / udp 192.0.2.4;branch=z9hG4bKabc".parse().unwrap();
        assert_eq!(via.transport(), "UDP");
        assert_eq!(via.host(), "192.0.2.4");
        assert_eq!(via.to_string(), "SIP/2.0/UDP 192.0.2.4;branch=z9hG4bKabc");
    }

    #[test]
    fn test_new_and_received() {
        let mut via = Via::new("udp", "10.0.0.1", Some(5060), "z9hG4bKx");
        via.set_received("192.0.2.9");
        assert_eq!(
            via.to_string(),
            "SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKx;received=192.0.2.9"
        );
    }

    #[test]
    fn test_invalid_via() {
        assert!("SIP/2.0/UDP".parse::<Via>().is_err());
        assert!("HTTP/1.1/TCP host".parse::<Via>().is_err());
        assert!("SIP/2.0/UDP host:port".parse::<Via>().is_err());
        assert!("garbage".parse::<Via>().is_err());
    }
}
