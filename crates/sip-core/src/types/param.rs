//! # SIP Parameters
//!
//! Generic `;name=value` parameters as they appear on URIs and on header values
//! (`Via: ...;branch=z9hG4bK..`, `To: <sip:bob@b.com>;tag=a6c85cf`).
//!
//! Parameter names compare case-insensitively (RFC 3261 §7.3.1). Values are kept
//! verbatim, including surrounding quotes, so a value round-trips unchanged.
//! A parameter without `=` is a flag (`;lr`, `;rport`).
//!
//! ```rust
//! use siphon_sip_core::types::Params;
//!
//! let params: Params = "branch=z9hG4bK74bf9;rport;received=192.0.2.1".parse().unwrap();
//! assert_eq!(params.value("Branch"), Some("z9hG4bK74bf9"));
//! assert!(params.contains("rport"));
//! assert_eq!(params.value("rport"), None);
//! assert_eq!(params.to_string(), ";branch=z9hG4bK74bf9;rport;received=192.0.2.1");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered list of parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    entries: Vec<(String, Option<String>)>,
}

impl Params {
    /// Empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a parameter named `name` is present (flag or valued)
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Value of `name`; `None` when absent or when it is a flag
    pub fn value(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|i| self.entries[i].1.as_deref())
    }

    /// Set `name`, replacing an existing entry in place
    pub fn set(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Remove `name`, returning whether it was present
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl FromStr for Params {
    type Err = Error;

    /// Parse `a=b;c;d="x;y"`. A leading `;` is accepted.
    fn from_str(s: &str) -> Result<Self> {
        let mut params = Params::new();
        let s = s.trim();
        let s = s.strip_prefix(';').unwrap_or(s);
        if s.is_empty() {
            return Ok(params);
        }

        for part in split_unquoted(s, ';') {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::ParseError(format!("empty parameter in '{}'", s)));
            }
            match part.split_once('=') {
                Some((name, value)) => {
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(Error::ParseError(format!("parameter without name in '{}'", s)));
                    }
                    params.entries.push((name.to_string(), Some(value.trim().to_string())));
                }
                None => params.entries.push((part.to_string(), None)),
            }
        }
        Ok(params)
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            match value {
                Some(v) => write!(f, ";{}={}", name, v)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

/// Split on `sep` outside of double quotes and angle brackets
pub(crate) fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => depth += 1,
            '>' if !in_quotes => depth = depth.saturating_sub(1),
            c if c == sep && !in_quotes && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Byte offset of the first `c` outside double quotes
pub(crate) fn find_unquoted(s: &str, c: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ch if ch == c && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_and_values() {
        let p: Params = ";transport=tcp;lr".parse().unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.value("transport"), Some("tcp"));
        assert!(p.contains("LR"));
    }

    #[test]
    fn test_quoted_separator_is_kept() {
        let p: Params = "text=\"a;b\";x=1".parse().unwrap();
        assert_eq!(p.value("text"), Some("\"a;b\""));
        assert_eq!(p.value("x"), Some("1"));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut p: Params = "a=1;b=2".parse().unwrap();
        p.set("A", Some("3".into()));
        assert_eq!(p.to_string(), ";a=3;b=2");
        assert!(p.remove("b"));
        assert!(!p.remove("b"));
        assert_eq!(p.to_string(), ";a=3");
    }

    #[test]
    fn test_empty_parameter_rejected() {
        assert!("a=1;;b".parse::<Params>().is_err());
        assert!("=x".parse::<Params>().is_err());
        assert!("".parse::<Params>().unwrap().is_empty());
    }

    #[test]
    fn test_split_unquoted_respects_brackets() {
        let parts = split_unquoted("<sip:a@b;lr>, \"x,y\" <sip:c@d>", ',');
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].trim(), "\"x,y\" <sip:c@d>");
    }
}
