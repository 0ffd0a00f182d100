use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::header::name::HeaderName;
use crate::header::registry::HeaderKind;
use crate::types::{Address, Params, Via};

/// Decoded header value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderValue {
    /// Opaque text
    Text(String),
    /// `value;param=x`
    Parameterable {
        /// Text before the first `;`
        value: String,
        /// Trailing parameters
        params: Params,
    },
    /// name-addr / addr-spec
    Address(Address),
    /// Via hop
    Via(Via),
}

impl HeaderValue {
    /// Text value
    pub fn text(value: impl Into<String>) -> Self {
        HeaderValue::Text(value.into())
    }

    /// Decode `raw` according to the grammar of `name`.
    ///
    /// System headers must decode cleanly. Other headers whose value does not fit
    /// their grammar are kept as [`HeaderValue::Text`].
    pub fn parse(name: &HeaderName, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let decoded = match name.kind() {
            HeaderKind::String => return Ok(HeaderValue::Text(raw.to_string())),
            HeaderKind::Via => raw.parse::<Via>().map(HeaderValue::Via),
            HeaderKind::Address => raw.parse::<Address>().map(HeaderValue::Address),
            HeaderKind::Parameterable => parse_parameterable(raw),
        };

        match decoded {
            Ok(value) => Ok(value),
            Err(e) if name.is_system() => Err(match e {
                Error::InvalidHeader { .. } => e,
                other => Error::invalid_header(name.as_str(), other.to_string()),
            }),
            Err(_) => Ok(HeaderValue::Text(raw.to_string())),
        }
    }

    /// Text view, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Address view
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            HeaderValue::Address(a) => Some(a),
            _ => None,
        }
    }

    /// Mutable address view
    pub fn as_address_mut(&mut self) -> Option<&mut Address> {
        match self {
            HeaderValue::Address(a) => Some(a),
            _ => None,
        }
    }

    /// Via view
    pub fn as_via(&self) -> Option<&Via> {
        match self {
            HeaderValue::Via(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable Via view
    pub fn as_via_mut(&mut self) -> Option<&mut Via> {
        match self {
            HeaderValue::Via(v) => Some(v),
            _ => None,
        }
    }
}

fn parse_parameterable(raw: &str) -> Result<HeaderValue> {
    let (value, params) = match raw.find(';') {
        Some(i) => (&raw[..i], raw[i..].parse::<Params>()?),
        None => (raw, Params::new()),
    };
    Ok(HeaderValue::Parameterable {
        value: value.trim().to_string(),
        params,
    })
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(s) => f.write_str(s),
            HeaderValue::Parameterable { value, params } => write!(f, "{}{}", value, params),
            HeaderValue::Address(a) => fmt::Display::fmt(a, f),
            HeaderValue::Via(v) => fmt::Display::fmt(v, f),
        }
    }
}

impl From<Address> for HeaderValue {
    fn from(a: Address) -> Self {
        HeaderValue::Address(a)
    }
}

impl From<Via> for HeaderValue {
    fn from(v: Via) -> Self {
        HeaderValue::Via(v)
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Text(s)
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Text(s.to_string())
    }
}

/// One header line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderField {
    /// Name
    pub name: HeaderName,
    /// Value
    pub value: HeaderValue,
}

impl HeaderField {
    /// New field
    pub fn new(name: impl Into<HeaderName>, value: impl Into<HeaderValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered header multimap.
///
/// Preserves wire order across all names. Repeated names keep their relative
/// order, which matters for Via and Route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    fields: Vec<HeaderField>,
}

impl Headers {
    /// Empty header set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of header fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no header fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First value of `name`
    pub fn get(&self, name: impl Into<HeaderName>) -> Option<&HeaderValue> {
        let name = name.into();
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Mutable first value of `name`
    pub fn get_mut(&mut self, name: impl Into<HeaderName>) -> Option<&mut HeaderValue> {
        let name = name.into();
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .map(|f| &mut f.value)
    }

    /// All values of `name`, in order
    pub fn get_all(&self, name: impl Into<HeaderName>) -> impl Iterator<Item = &HeaderValue> {
        let name = name.into();
        self.fields
            .iter()
            .filter(move |f| f.name == name)
            .map(|f| &f.value)
    }

    /// Whether `name` is present
    pub fn contains(&self, name: impl Into<HeaderName>) -> bool {
        self.get(name).is_some()
    }

    /// Append a field
    pub fn push(&mut self, name: impl Into<HeaderName>, value: impl Into<HeaderValue>) {
        self.fields.push(HeaderField::new(name, value));
    }

    /// Insert a field before every other field of the same name (new topmost Via)
    pub fn push_front(&mut self, name: impl Into<HeaderName>, value: impl Into<HeaderValue>) {
        let field = HeaderField::new(name, value);
        let at = self
            .fields
            .iter()
            .position(|f| f.name == field.name)
            .unwrap_or(self.fields.len());
        self.fields.insert(at, field);
    }

    /// Replace every value of `name` with `value`, keeping the position of the first
    pub fn set(&mut self, name: impl Into<HeaderName>, value: impl Into<HeaderValue>) {
        let field = HeaderField::new(name, value);
        match self.fields.iter().position(|f| f.name == field.name) {
            Some(at) => {
                let name = field.name.clone();
                self.fields[at] = field;
                let mut index = 0;
                self.fields.retain(|f| {
                    let keep = index <= at || f.name != name;
                    index += 1;
                    keep
                });
            }
            None => self.fields.push(field),
        }
    }

    /// Remove and return the first value of `name`
    pub fn remove_first(&mut self, name: impl Into<HeaderName>) -> Option<HeaderValue> {
        let name = name.into();
        let at = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(at).value)
    }

    /// Remove every value of `name`, returning how many were removed
    pub fn remove_all(&mut self, name: impl Into<HeaderName>) -> usize {
        let name = name.into();
        let before = self.fields.len();
        self.fields.retain(|f| f.name != name);
        before - self.fields.len()
    }

    /// Iterate fields in order
    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a HeaderField;
    type IntoIter = std::slice::Iter<'a, HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::registry::SipHeader;

    fn via(branch: &str) -> HeaderValue {
        HeaderValue::Via(Via::new("UDP", "h", None, branch))
    }

    #[test]
    fn test_order_and_multi_values() {
        let mut h = Headers::new();
        h.push(SipHeader::Via, via("z9hG4bK1"));
        h.push("X-A", "1");
        h.push(SipHeader::Via, via("z9hG4bK2"));
        let branches: Vec<_> = h
            .get_all(SipHeader::Via)
            .filter_map(|v| v.as_via()?.branch())
            .collect();
        assert_eq!(branches, vec!["z9hG4bK1", "z9hG4bK2"]);

        h.push_front(SipHeader::Via, via("z9hG4bK0"));
        assert_eq!(h.get("v").and_then(|v| v.as_via()?.branch()), Some("z9hG4bK0"));
    }

    #[test]
    fn test_set_replaces_all_in_place() {
        let mut h = Headers::new();
        h.push("X-A", "1");
        h.push("Subject", "a");
        h.push("X-A", "2");
        h.set("x-a", "3");
        let names: Vec<_> = h.iter().map(|f| f.name.as_str().to_string()).collect();
        assert_eq!(names, vec!["X-A", "Subject"]);
        assert_eq!(h.get("X-A").and_then(HeaderValue::as_text), Some("3"));
    }

    #[test]
    fn test_remove() {
        let mut h = Headers::new();
        h.push("X-A", "1");
        h.push("X-A", "2");
        assert_eq!(h.remove_first("X-A"), Some(HeaderValue::text("1")));
        assert_eq!(h.remove_all("X-A"), 1);
        assert!(h.is_empty());
    }

    #[test]
    fn test_value_parse_fallback() {
        let contact = HeaderName::from(SipHeader::Contact);
        assert_eq!(
            HeaderValue::parse(&contact, "*").unwrap(),
            HeaderValue::text("*")
        );
        let to = HeaderName::from(SipHeader::To);
        assert!(HeaderValue::parse(&to, "not an address").is_err());

        let ct = HeaderName::from(SipHeader::ContentType);
        match HeaderValue::parse(&ct, "application/sdp;charset=utf-8").unwrap() {
            HeaderValue::Parameterable { value, params } => {
                assert_eq!(value, "application/sdp");
                assert_eq!(params.value("charset"), Some("utf-8"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
