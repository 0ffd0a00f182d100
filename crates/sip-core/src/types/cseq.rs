//! CSeq header value (RFC 3261 §20.16): a sequence number and the request method.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::method::Method;

/// `CSeq: 4711 INVITE`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CSeq {
    /// Sequence number, below 2**31 per RFC 3261 §8.1.1.5
    pub seq: u32,
    /// Request method
    pub method: Method,
}

impl CSeq {
    /// New CSeq value
    pub fn new(seq: u32, method: Method) -> Self {
        Self { seq, method }
    }
}

impl FromStr for CSeq {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (Some(seq), Some(method), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::invalid_header("CSeq", format!("expected '<seq> <method>', got '{}'", s)));
        };
        let seq: u32 = seq
            .parse()
            .map_err(|_| Error::invalid_header("CSeq", format!("invalid sequence number '{}'", seq)))?;
        if seq >= 1 << 31 {
            return Err(Error::invalid_header("CSeq", format!("sequence number {} out of range", seq)));
        }
        Ok(CSeq::new(seq, method.parse()?))
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let cseq: CSeq = " 314159  INVITE ".parse().unwrap();
        assert_eq!(cseq, CSeq::new(314159, Method::Invite));
        assert_eq!(cseq.to_string(), "314159 INVITE");
    }

    #[test]
    fn test_invalid() {
        assert!("INVITE".parse::<CSeq>().is_err());
        assert!("1 INVITE extra".parse::<CSeq>().is_err());
        assert!("-1 INVITE".parse::<CSeq>().is_err());
        assert!("2147483648 INVITE".parse::<CSeq>().is_err());
    }
}
