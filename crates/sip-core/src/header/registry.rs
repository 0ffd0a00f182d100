//! # Header Registry
//!
//! Static table of the well-known SIP header names. Every entry carries its
//! canonical display string, the [`HeaderKind`] that decides how its value is
//! parsed, whether it is a *system* header (single-valued or owned by the stack,
//! never settable by applications) and a precomputed `"Name: "` byte sequence
//! used when serializing.
//!
//! ## Lookup
//!
//! Names are recognized without allocating. Each registered name is hashed once
//! at startup with a case-insensitive base-31 polynomial (lowercase ASCII folded to
//! uppercase, 32-bit wrapping arithmetic) and placed into a 4096-slot table. A
//! lookup hashes the candidate bytes the same way, indexes the table and then
//! confirms the hit with a full case-insensitive comparison, so unregistered names
//! that happen to land in an occupied slot are rejected.
//!
//! Building the table verifies that no two registered names share a slot. A clash
//! is a definition bug in this file, so the first access to the registry panics
//! instead of letting the stack run with a silently shadowed header.
//!
//! ```rust
//! use siphon_sip_core::header::registry::{self, SipHeader};
//!
//! assert_eq!(registry::lookup(b"call-id"), Some(SipHeader::CallId));
//! assert_eq!(registry::lookahead(b"VIA: SIP/2.0/UDP host"), Some((SipHeader::Via, 3)));
//! assert_eq!(registry::lookup(b"X-Unknown"), None);
//! assert_eq!(SipHeader::CSeq.bytes_colon_space(), b"CSeq: ");
//! ```

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Number of slots in the hash table
pub const TABLE_SIZE: usize = 4096;

/// How a header value is decoded after the name has been recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderKind {
    /// Opaque text
    String,
    /// `value;param=x;flag`
    Parameterable,
    /// name-addr / addr-spec with header parameters (From, To, Route, ...)
    Address,
    /// Via hop
    Via,
}

macro_rules! sip_headers {
    ( $( $variant:ident => ($name:literal, $kind:ident, $system:literal, $list:literal) ),* $(,)? ) => {
        /// Well-known SIP header
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum SipHeader {
            $(
                #[allow(missing_docs)]
                $variant,
            )*
        }

        impl SipHeader {
            /// Every registered header, in declaration order
            pub const ALL: &'static [SipHeader] = &[ $( SipHeader::$variant ),* ];

            /// Canonical display string
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( SipHeader::$variant => $name ),*
                }
            }

            /// Value grammar of this header
            pub const fn kind(self) -> HeaderKind {
                match self {
                    $( SipHeader::$variant => HeaderKind::$kind ),*
                }
            }

            /// System headers are managed by the stack and cannot be set by applications
            pub const fn is_system(self) -> bool {
                match self {
                    $( SipHeader::$variant => $system ),*
                }
            }

            /// Whether one header line may carry several comma-separated values
            pub const fn is_list(self) -> bool {
                match self {
                    $( SipHeader::$variant => $list ),*
                }
            }
        }
    };
}

sip_headers! {
    Via => ("Via", Via, true, true),
    MaxForwards => ("Max-Forwards", String, false, false),
    Route => ("Route", Address, true, true),
    RecordRoute => ("Record-Route", Address, true, true),
    From => ("From", Address, true, false),
    To => ("To", Address, true, false),
    CallId => ("Call-ID", String, true, false),
    CSeq => ("CSeq", String, true, false),
    Contact => ("Contact", Address, false, true),

    Accept => ("Accept", String, false, false),
    AcceptContact => ("Accept-Contact", String, false, false),
    AcceptEncoding => ("Accept-Encoding", String, false, false),
    AcceptLanguage => ("Accept-Language", String, false, false),
    AcceptResourcePriority => ("Accept-Resource-Priority", String, false, false),
    AlertInfo => ("Alert-Info", String, false, false),
    Allow => ("Allow", String, false, false),
    AllowEvents => ("Allow-Events", String, false, false),
    AuthenticationInfo => ("Authentication-Info", String, false, false),
    Authorization => ("Authorization", String, false, false),

    CallInfo => ("Call-Info", String, false, false),

    ContentDisposition => ("Content-Disposition", Parameterable, false, false),
    ContentEncoding => ("Content-Encoding", String, false, false),
    ContentLanguage => ("Content-Language", String, false, false),
    ContentLength => ("Content-Length", String, false, false),
    ContentType => ("Content-Type", Parameterable, false, false),

    Date => ("Date", String, false, false),
    ErrorInfo => ("Error-Info", String, false, false),
    Event => ("Event", Parameterable, false, false),
    Expires => ("Expires", String, false, false),

    HistoryInfo => ("History-Info", String, false, false),
    Identity => ("Identity", String, false, false),
    IdentityInfo => ("Identity-Info", String, false, false),
    InReplyTo => ("In-Reply-To", String, false, false),
    Join => ("Join", String, false, false),

    MimeVersion => ("MIME-Version", String, false, false),
    MinExpires => ("Min-Expires", String, false, false),
    MinSe => ("Min-SE", String, false, false),
    Organization => ("Organization", String, false, false),
    PAccessNetworkInfo => ("P-Access-Network-Info", String, false, false),
    PAssertedIdentity => ("P-Asserted-Identity", Address, false, true),
    PAssociatedUri => ("P-Associated-URI", Address, false, true),
    PCalledPartyId => ("P-Called-Party-ID", Address, false, false),
    PChargingFunctionAddresses => ("P-Charging-Function-Addresses", String, false, false),
    PChargingVector => ("P-Charging-Vector", String, false, false),
    PMediaAuthorization => ("P-Media-Authorization", String, false, false),
    PPreferredIdentity => ("P-Preferred-Identity", Address, false, true),
    PUserDatabase => ("P-User-Database", String, false, false),
    PVisitedNetworkId => ("P-Visited-Network-ID", String, false, false),
    Path => ("Path", Address, false, true),
    Priority => ("Priority", String, false, false),
    Privacy => ("Privacy", String, false, false),
    ProxyAuthenticate => ("Proxy-Authenticate", String, false, false),
    ProxyAuthorization => ("Proxy-Authorization", String, false, false),
    ProxyRequire => ("Proxy-Require", String, false, false),
    RAck => ("RAck", String, true, false),
    Reason => ("Reason", Parameterable, false, false),

    ReferSub => ("Refer-Sub", Parameterable, false, false),
    ReferTo => ("Refer-To", Address, false, false),
    ReferredBy => ("Referred-By", Address, false, false),
    RejectContact => ("Reject-Contact", String, false, false),
    Replaces => ("Replaces", Parameterable, false, false),
    ReplyTo => ("Reply-To", Address, false, false),
    RequestDisposition => ("Request-Disposition", String, false, false),
    Require => ("Require", String, false, false),
    ResourcePriority => ("Resource-Priority", String, false, false),
    RetryAfter => ("Retry-After", Parameterable, false, false),

    RSeq => ("RSeq", String, true, false),
    SecurityClient => ("Security-Client", String, false, false),
    SecurityServer => ("Security-Server", String, false, false),
    SecurityVerify => ("Security-Verify", String, false, false),
    Server => ("Server", String, false, false),
    ServiceRoute => ("Service-Route", Address, false, true),
    SessionExpires => ("Session-Expires", Parameterable, false, false),
    SipETag => ("SIP-ETag", String, false, false),
    SipIfMatch => ("SIP-If-Match", String, false, false),
    Subject => ("Subject", String, false, false),
    SubscriptionState => ("Subscription-State", Parameterable, false, false),
    Supported => ("Supported", String, false, false),
    TargetDialog => ("Target-Dialog", Parameterable, false, false),
    Timestamp => ("Timestamp", String, false, false),

    Unsupported => ("Unsupported", String, false, false),
    UserAgent => ("User-Agent", String, false, false),

    Warning => ("Warning", String, false, false),
    WwwAuthenticate => ("WWW-Authenticate", String, false, false),
}

impl SipHeader {
    /// `"Name: "` as bytes, ready to be copied into an output buffer
    pub fn bytes_colon_space(self) -> &'static [u8] {
        &REGISTRY.colon_space[self as usize]
    }

    /// Header for an RFC 3261 §7.3.3 compact form (`v`, `f`, `t`, ...)
    pub fn from_compact(b: u8) -> Option<SipHeader> {
        let header = match b.to_ascii_lowercase() {
            b'a' => SipHeader::AcceptContact,
            b'b' => SipHeader::ReferredBy,
            b'c' => SipHeader::ContentType,
            b'd' => SipHeader::RequestDisposition,
            b'e' => SipHeader::ContentEncoding,
            b'f' => SipHeader::From,
            b'i' => SipHeader::CallId,
            b'j' => SipHeader::RejectContact,
            b'k' => SipHeader::Supported,
            b'l' => SipHeader::ContentLength,
            b'm' => SipHeader::Contact,
            b'n' => SipHeader::IdentityInfo,
            b'o' => SipHeader::Event,
            b'r' => SipHeader::ReferTo,
            b's' => SipHeader::Subject,
            b't' => SipHeader::To,
            b'u' => SipHeader::AllowEvents,
            b'v' => SipHeader::Via,
            b'x' => SipHeader::SessionExpires,
            b'y' => SipHeader::Identity,
            _ => return None,
        };
        Some(header)
    }
}

impl fmt::Display for SipHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two registered names landing in the same slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCollision {
    /// Slot index both names hash to
    pub slot: usize,
    /// Name registered first
    pub existing: String,
    /// Name that clashed with it
    pub duplicate: String,
}

impl fmt::Display for HashCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate header hash {} for '{}' and '{}'",
            self.slot, self.duplicate, self.existing
        )
    }
}

impl std::error::Error for HashCollision {}

#[inline]
fn fold_upper(b: u8) -> u8 {
    if b >= b'a' {
        b.wrapping_sub(b'a' - b'A')
    } else {
        b
    }
}

/// Case-insensitive base-31 hash of a header name, reduced to a table slot
#[inline]
pub fn slot_of(name: &[u8]) -> usize {
    let mut h: i32 = 0;
    for &b in name {
        h = h.wrapping_mul(31).wrapping_add(fold_upper(b) as i32);
    }
    (h % TABLE_SIZE as i32).unsigned_abs() as usize
}

/// Slot table mapping header hashes to indices of a name list
#[derive(Debug)]
pub struct HashTable {
    slots: Vec<Option<u16>>,
    max_len: usize,
}

impl HashTable {
    /// Build a table over `names`, failing on the first slot clash
    pub fn build<S: AsRef<str>>(names: &[S]) -> Result<Self, HashCollision> {
        let mut slots: Vec<Option<u16>> = vec![None; TABLE_SIZE];
        let mut max_len = 0;

        for (index, name) in names.iter().enumerate() {
            let name = name.as_ref();
            max_len = max_len.max(name.len());
            let slot = slot_of(name.as_bytes());
            if let Some(existing) = slots[slot] {
                return Err(HashCollision {
                    slot,
                    existing: names[existing as usize].as_ref().to_string(),
                    duplicate: name.to_string(),
                });
            }
            slots[slot] = Some(index as u16);
        }

        Ok(Self { slots, max_len })
    }

    /// Index of the entry whose slot `name` hashes to, before confirmation
    #[inline]
    pub fn candidate(&self, name: &[u8]) -> Option<usize> {
        if name.is_empty() || name.len() > self.max_len {
            return None;
        }
        self.slots[slot_of(name)].map(|i| i as usize)
    }

    /// Length of the longest registered name
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

struct Registry {
    table: HashTable,
    colon_space: Vec<Box<[u8]>>,
}

impl Registry {
    fn build() -> Result<Self, HashCollision> {
        let names: Vec<&'static str> = SipHeader::ALL.iter().map(|h| h.as_str()).collect();
        let table = HashTable::build(&names)?;
        let colon_space = SipHeader::ALL
            .iter()
            .map(|h| format!("{}: ", h.as_str()).into_bytes().into_boxed_slice())
            .collect();
        Ok(Self { table, colon_space })
    }
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| match Registry::build() {
    Ok(registry) => {
        tracing::debug!(headers = SipHeader::ALL.len(), "SIP header registry built");
        registry
    }
    // A clash means two entries above shadow each other; refuse to run.
    Err(collision) => panic!("SIP header registry definition error: {}", collision),
});

/// Force construction of the registry.
///
/// Called from server start-up so a definition error aborts before any traffic
/// is accepted rather than on the first parsed message.
pub fn init() {
    Lazy::force(&REGISTRY);
}

/// Recognize `name` (the complete header name, no separator) as a registered header.
///
/// Matching is ASCII case-insensitive. Compact forms are not registered names and
/// are not recognized here; see [`SipHeader::from_compact`].
pub fn lookup(name: &[u8]) -> Option<SipHeader> {
    let index = REGISTRY.table.candidate(name)?;
    let header = SipHeader::ALL[index];
    if header.as_str().as_bytes().eq_ignore_ascii_case(name) {
        Some(header)
    } else {
        None
    }
}

/// [`lookup`] over a string slice
pub fn lookup_str(name: &str) -> Option<SipHeader> {
    lookup(name.as_bytes())
}

/// Recognize the header name at the start of a raw header line.
///
/// The name ends at the first `:`, space or tab. Returns the header and the
/// length of the name in bytes, or `None` when no separator appears within the
/// longest registered name length or the name is not registered.
pub fn lookahead(line: &[u8]) -> Option<(SipHeader, usize)> {
    let limit = line.len().min(REGISTRY.table.max_len() + 1);
    let end = line[..limit]
        .iter()
        .position(|&b| b == b':' || b == b' ' || b == b'\t')?;
    lookup(&line[..end]).map(|h| (h, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds_without_collisions() {
        let names: Vec<&str> = SipHeader::ALL.iter().map(|h| h.as_str()).collect();
        assert!(HashTable::build(&names).is_ok());
        assert_eq!(SipHeader::ALL.len(), 84);
    }

    #[test]
    fn test_collision_is_detected() {
        // "A_" and "B@" share the same base-31 hash.
        let err = HashTable::build(&["A_", "B@"]).unwrap_err();
        assert_eq!(err.existing, "A_");
        assert_eq!(err.duplicate, "B@");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup(b"Via"), Some(SipHeader::Via));
        assert_eq!(lookup(b"vIA"), Some(SipHeader::Via));
        assert_eq!(lookup(b"CALL-ID"), Some(SipHeader::CallId));
        assert_eq!(lookup(b"www-authenticate"), Some(SipHeader::WwwAuthenticate));
        assert_eq!(lookup_str("p-charging-function-addresses"), Some(SipHeader::PChargingFunctionAddresses));
    }

    #[test]
    fn test_lookup_rejects_unregistered() {
        assert_eq!(lookup(b""), None);
        assert_eq!(lookup(b"X-Custom"), None);
        assert_eq!(lookup(b"Vias"), None);
        assert_eq!(lookup(b"Vi"), None);
        // compact forms are not registered names
        assert_eq!(lookup(b"v"), None);
    }

    #[test]
    fn test_lookup_rejects_same_slot_different_bytes() {
        // "To" and "U0" collide under the base-31 hash.
        assert_eq!(slot_of(b"To"), slot_of(b"U0"));
        assert_eq!(lookup(b"U0"), None);
        assert_eq!(lookup(b"To"), Some(SipHeader::To));
    }

    #[test]
    fn test_lookahead_separators() {
        assert_eq!(lookahead(b"From: <sip:a@b>"), Some((SipHeader::From, 4)));
        assert_eq!(lookahead(b"from:<sip:a@b>"), Some((SipHeader::From, 4)));
        assert_eq!(lookahead(b"CSeq : 1 INVITE"), Some((SipHeader::CSeq, 4)));
        assert_eq!(lookahead(b"Max-Forwards\t: 70"), Some((SipHeader::MaxForwards, 12)));
        assert_eq!(lookahead(b"X-Foo: bar"), None);
        assert_eq!(lookahead(b"Via"), None);
    }

    #[test]
    fn test_lookahead_longest_name() {
        let line = b"P-Charging-Function-Addresses: ccf=192.1.1.1";
        assert_eq!(
            lookahead(line),
            Some((SipHeader::PChargingFunctionAddresses, 29))
        );
    }

    #[test]
    fn test_descriptor_attributes() {
        assert_eq!(SipHeader::Via.kind(), HeaderKind::Via);
        assert_eq!(SipHeader::To.kind(), HeaderKind::Address);
        assert_eq!(SipHeader::ContentType.kind(), HeaderKind::Parameterable);
        assert_eq!(SipHeader::Subject.kind(), HeaderKind::String);
        assert!(SipHeader::CallId.is_system());
        assert!(SipHeader::RSeq.is_system());
        assert!(!SipHeader::Contact.is_system());
        assert_eq!(SipHeader::MaxForwards.bytes_colon_space(), b"Max-Forwards: ");
    }

    #[test]
    fn test_compact_forms() {
        assert_eq!(SipHeader::from_compact(b'v'), Some(SipHeader::Via));
        assert_eq!(SipHeader::from_compact(b'I'), Some(SipHeader::CallId));
        assert_eq!(SipHeader::from_compact(b'l'), Some(SipHeader::ContentLength));
        assert_eq!(SipHeader::from_compact(b'z'), None);
    }
}
