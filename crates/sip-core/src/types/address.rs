//! # Addresses
//!
//! Value of the address-valued headers (From, To, Contact, Route, Record-Route, ...):
//! an optional display name, a URI and header parameters such as `tag`.
//!
//! Both forms of RFC 3261 §20 are accepted:
//!
//! - name-addr: `"Alice" <sip:alice@atlanta.com;transport=udp>;tag=1928301774`
//! - addr-spec: `sip:alice@atlanta.com;tag=1928301774`
//!
//! In the addr-spec form every `;param` belongs to the header, not the URI.
//! Serialization always uses the name-addr form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::param::{find_unquoted, Params};
use crate::types::uri::Uri;

/// Address header value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    display_name: Option<String>,
    uri: Uri,
    params: Params,
}

impl Address {
    /// Address without display name or parameters
    pub fn new(uri: Uri) -> Self {
        Self {
            display_name: None,
            uri,
            params: Params::new(),
        }
    }

    /// Builder-style display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Builder-style tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.set_tag(tag);
        self
    }

    /// Display name without quotes
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// URI
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Header parameters
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Mutable header parameters
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// `tag` parameter
    pub fn tag(&self) -> Option<&str> {
        self.params.value("tag")
    }

    /// Set the `tag` parameter
    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.params.set("tag", Some(tag.into()));
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ParseError("empty address".to_string()));
        }

        let lt = find_unquoted(s, '<');
        let Some(lt) = lt else {
            // addr-spec: parameters after the URI are header parameters
            let (uri, params) = match s.find(';') {
                Some(i) => (&s[..i], s[i..].parse::<Params>()?),
                None => (s, Params::new()),
            };
            return Ok(Address {
                display_name: None,
                uri: uri.parse()?,
                params,
            });
        };

        let gt = s[lt..]
            .find('>')
            .map(|i| lt + i)
            .ok_or_else(|| Error::ParseError(format!("unterminated '<' in '{}'", s)))?;

        let display = s[..lt].trim();
        let display_name = if display.is_empty() {
            None
        } else if let Some(quoted) = display.strip_prefix('"') {
            let inner = quoted
                .strip_suffix('"')
                .ok_or_else(|| Error::ParseError(format!("unterminated display name in '{}'", s)))?;
            Some(inner.replace("\\\"", "\"").replace("\\\\", "\\"))
        } else {
            Some(display.to_string())
        };

        let uri: Uri = s[lt + 1..gt].parse()?;
        let rest = s[gt + 1..].trim();
        let params = if rest.is_empty() {
            Params::new()
        } else if rest.starts_with(';') {
            rest.parse()?
        } else {
            return Err(Error::ParseError(format!("unexpected text after '>' in '{}'", s)));
        };

        Ok(Address {
            display_name,
            uri,
            params,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name.replace('\\', "\\\\").replace('"', "\\\""))?;
        }
        write!(f, "<{}>{}", self.uri, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_addr() {
        let a: Address = "\"Alice Liddell\" <sip:alice@atlanta.com;transport=udp>;tag=1928301774"
            .parse()
            .unwrap();
        assert_eq!(a.display_name(), Some("Alice Liddell"));
        assert_eq!(a.uri().param("transport"), Some("udp"));
        assert_eq!(a.tag(), Some("1928301774"));
    }

    #[test]
    fn test_addr_spec_params_belong_to_header() {
        let a: Address = "sip:bob@biloxi.com;tag=a6c85cf".parse().unwrap();
        assert_eq!(a.tag(), Some("a6c85cf"));
        assert!(a.uri().params().is_empty());
        assert_eq!(a.to_string(), "<sip:bob@biloxi.com>;tag=a6c85cf");
    }

    #[test]
    fn test_unquoted_display_name() {
        let a: Address = "Bob <sip:bob@biloxi.com>".parse().unwrap();
        assert_eq!(a.display_name(), Some("Bob"));
        assert_eq!(a.tag(), None);
    }

    #[test]
    fn test_set_tag_round_trip() {
        let mut a: Address = "<sip:bob@biloxi.com>".parse().unwrap();
        a.set_tag("xyz");
        let b: Address = a.to_string().parse().unwrap();
        assert_eq!(b.tag(), Some("xyz"));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!("".parse::<Address>().is_err());
        assert!("<sip:bob@biloxi.com".parse::<Address>().is_err());
        assert!("<sip:bob@biloxi.com> junk".parse::<Address>().is_err());
        assert!("*".parse::<Address>().is_err());
    }
}
