//! # SIP URIs
//!
//! `sip:`, `sips:` and `tel:` URIs (RFC 3261 §19.1, RFC 3966).
//!
//! ```text
//! sip:user:password@host:port;uri-parameters?headers
//! ```
//!
//! The password component, when present, stays part of [`Uri::user`]. URI headers
//! (`?subject=x`) are kept as raw text.
//!
//! ```rust
//! use siphon_sip_core::types::Uri;
//!
//! let uri: Uri = "sip:alice@atlanta.example.com:5070;transport=udp".parse().unwrap();
//! assert_eq!(uri.scheme(), "sip");
//! assert_eq!(uri.user(), Some("alice"));
//! assert_eq!(uri.host(), "atlanta.example.com");
//! assert_eq!(uri.port(), Some(5070));
//! assert_eq!(uri.param("transport"), Some("udp"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::param::Params;

/// Parsed SIP/SIPS/TEL URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uri {
    scheme: String,
    user: Option<String>,
    host: String,
    port: Option<u16>,
    params: Params,
    headers: Option<String>,
}

impl Uri {
    /// `sip:host`
    pub fn sip(host: impl Into<String>) -> Self {
        Self {
            scheme: "sip".to_string(),
            user: None,
            host: host.into(),
            port: None,
            params: Params::new(),
            headers: None,
        }
    }

    /// Builder-style user part
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Builder-style port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder-style URI parameter
    pub fn with_param(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.params.set(name, value);
        self
    }

    /// `sip`, `sips` or `tel`, lowercased
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// User part (for `tel:` URIs, the number)
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Host (IPv6 references keep their brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// URI parameters
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Mutable URI parameters
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// Value of a URI parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.value(name)
    }

    /// Raw `?headers` component
    pub fn headers(&self) -> Option<&str> {
        self.headers.as_deref()
    }

    /// `host[:port]`
    pub fn host_port(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidUri(format!("missing scheme in '{}'", s)))?;
        let scheme = scheme.to_ascii_lowercase();
        if !matches!(scheme.as_str(), "sip" | "sips" | "tel") {
            return Err(Error::InvalidUri(format!("unsupported scheme '{}'", scheme)));
        }

        let (rest, headers) = match rest.split_once('?') {
            Some((r, h)) => (r, Some(h.to_string())),
            None => (rest, None),
        };
        let (rest, params) = match rest.find(';') {
            Some(i) => (&rest[..i], rest[i..].parse::<Params>()?),
            None => (rest, Params::new()),
        };

        if scheme == "tel" {
            if rest.is_empty() {
                return Err(Error::InvalidUri(format!("empty tel number in '{}'", s)));
            }
            return Ok(Uri {
                scheme,
                user: Some(rest.to_string()),
                host: String::new(),
                port: None,
                params,
                headers,
            });
        }

        let (user, host_port) = match rest.rfind('@') {
            Some(i) => (Some(&rest[..i]), &rest[i + 1..]),
            None => (None, rest),
        };
        if matches!(user, Some("")) {
            return Err(Error::InvalidUri(format!("empty user part in '{}'", s)));
        }
        let (host, port) =
            parse_host_port(host_port).map_err(|e| Error::InvalidUri(format!("{} in '{}'", e, s)))?;

        Ok(Uri {
            scheme,
            user: user.map(str::to_string),
            host,
            port,
            params,
            headers,
        })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if self.scheme == "tel" {
            if let Some(number) = &self.user {
                f.write_str(number)?;
            }
        } else {
            if let Some(user) = &self.user {
                write!(f, "{}@", user)?;
            }
            f.write_str(&self.host_port())?;
        }
        write!(f, "{}", self.params)?;
        if let Some(headers) = &self.headers {
            write!(f, "?{}", headers)?;
        }
        Ok(())
    }
}

/// Split `host[:port]`, accepting bracketed IPv6 references
pub(crate) fn parse_host_port(s: &str) -> std::result::Result<(String, Option<u16>), String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty host".to_string());
    }

    let (host, port) = if s.starts_with('[') {
        let end = s.find(']').ok_or("unterminated IPv6 reference")?;
        let host = &s[..=end];
        match &s[end + 1..] {
            "" => (host, None),
            p => (host, Some(p.strip_prefix(':').ok_or("garbage after IPv6 reference")?)),
        }
    } else {
        match s.rsplit_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (s, None),
        }
    };

    if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == '@') {
        return Err(format!("invalid host '{}'", host));
    }
    let port = match port {
        Some(p) => Some(p.trim().parse::<u16>().map_err(|_| format!("invalid port '{}'", p))?),
        None => None,
    };
    Ok((host.to_string(), port))
}
