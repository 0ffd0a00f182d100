use std::fmt;

use siphon_sip_core::{Method, Request, Response, SipMessage};

/// Uniquely identifies a SIP transaction.
///
/// RFC 3261 §17.1.3 and §17.2.3 identify a transaction by the `branch` of the
/// topmost Via plus the method. The `is_server` flag keeps client and server
/// transactions apart when this node is both UAC and UAS for the same branch.
///
/// The method of an ACK is folded into INVITE, since an ACK to a non-2xx
/// response belongs to the INVITE transaction it acknowledges. CANCEL keeps its
/// own method: it is a transaction of its own, correlated to its target INVITE
/// through [`TransactionKey::with_method`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    /// Branch parameter of the topmost Via
    pub branch: String,
    /// Method of the transaction (never ACK)
    pub method: Method,
    /// `true` for server transactions
    pub is_server: bool,
}

impl TransactionKey {
    pub fn new(branch: impl Into<String>, method: Method, is_server: bool) -> Self {
        let method = if method == Method::Ack { Method::Invite } else { method };
        Self {
            branch: branch.into(),
            method,
            is_server,
        }
    }

    /// Server-side key for an incoming request
    ///
    /// `None` when the request has no Via or its branch is empty.
    pub fn from_request(request: &Request) -> Option<Self> {
        let branch = request.branch().filter(|b| !b.is_empty())?;
        Some(Self::new(branch, request.method().clone(), true))
    }

    /// Client-side key for an incoming response, using the CSeq method
    pub fn from_response(response: &Response) -> Option<Self> {
        let branch = response.branch().filter(|b| !b.is_empty())?;
        let cseq = response.cseq()?;
        Some(Self::new(branch, cseq.method, false))
    }

    /// Same branch and side, different method
    pub fn with_method(&self, method: Method) -> Self {
        Self::new(self.branch.clone(), method, self.is_server)
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }
}

impl fmt::Debug for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Format: `branch:METHOD:side`
impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_server { "server" } else { "client" };
        write!(f, "{}:{}:{}", self.branch, self.method, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_folds_into_invite() {
        let invite = TransactionKey::new("z9hG4bK1", Method::Invite, true);
        let ack = TransactionKey::new("z9hG4bK1", Method::Ack, true);
        assert_eq!(invite, ack);
        assert_ne!(invite, invite.with_method(Method::Cancel));
        assert_ne!(invite, TransactionKey::new("z9hG4bK1", Method::Invite, false));
        assert_eq!(invite.to_string(), "z9hG4bK1:INVITE:server");
    }
}
