use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::header::registry::{self, HeaderKind, SipHeader};
use crate::types::method::is_token_byte;

/// Header name: a registered header or an arbitrary extension name.
///
/// Equality and hashing are ASCII case-insensitive, and a registered name written
/// as [`HeaderName::Other`] still compares equal to its [`HeaderName::Known`] form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HeaderName {
    /// Entry of the header registry
    Known(SipHeader),
    /// Unregistered header, kept as written
    Other(String),
}

impl HeaderName {
    /// Resolve a full or compact header name
    pub fn new(name: &str) -> Self {
        if let Some(header) = registry::lookup_str(name) {
            return HeaderName::Known(header);
        }
        if name.len() == 1 {
            if let Some(header) = SipHeader::from_compact(name.as_bytes()[0]) {
                return HeaderName::Known(header);
            }
        }
        HeaderName::Other(name.to_string())
    }

    /// Display string (canonical for registered headers)
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::Known(h) => h.as_str(),
            HeaderName::Other(s) => s,
        }
    }

    /// Registered header, if any
    pub fn known(&self) -> Option<SipHeader> {
        match self {
            HeaderName::Known(h) => Some(*h),
            HeaderName::Other(_) => None,
        }
    }

    /// Value grammar; extension headers are plain text
    pub fn kind(&self) -> HeaderKind {
        self.known().map_or(HeaderKind::String, SipHeader::kind)
    }

    /// Whether applications are barred from modifying this header
    pub fn is_system(&self) -> bool {
        self.known().is_some_and(SipHeader::is_system)
    }

    /// Whether `self` names `header`
    pub fn is(&self, header: SipHeader) -> bool {
        *self == HeaderName::Known(header)
    }
}

impl PartialEq for HeaderName {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HeaderName::Known(a), HeaderName::Known(b)) => a == b,
            _ => self.as_str().eq_ignore_ascii_case(other.as_str()),
        }
    }
}

impl Eq for HeaderName {}

impl Hash for HeaderName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.as_str().bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl From<SipHeader> for HeaderName {
    fn from(header: SipHeader) -> Self {
        HeaderName::Known(header)
    }
}

impl From<&str> for HeaderName {
    fn from(name: &str) -> Self {
        HeaderName::new(name)
    }
}

impl From<String> for HeaderName {
    fn from(name: String) -> Self {
        HeaderName::new(&name)
    }
}

impl FromStr for HeaderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(is_token_byte) {
            return Err(Error::ParseError(format!("invalid header name '{}'", s)));
        }
        Ok(HeaderName::new(s))
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_resolution() {
        assert_eq!(HeaderName::new("call-id"), HeaderName::Known(SipHeader::CallId));
        assert_eq!(HeaderName::new("i"), HeaderName::Known(SipHeader::CallId));
        assert_eq!(HeaderName::new("X-Trace").as_str(), "X-Trace");
        assert!(HeaderName::new("To").is_system());
        assert!(!HeaderName::new("X-Trace").is_system());
    }

    #[test]
    fn test_case_insensitive_identity() {
        let a = HeaderName::Other("Via".into());
        let b = HeaderName::Known(SipHeader::Via);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(HeaderName::new("X-Foo"));
        assert!(set.contains(&HeaderName::new("x-foo")));
    }

    #[test]
    fn test_from_str_validates_token() {
        assert!("X Foo".parse::<HeaderName>().is_err());
        assert!("".parse::<HeaderName>().is_err());
        assert!("X-Foo".parse::<HeaderName>().is_ok());
    }
}
