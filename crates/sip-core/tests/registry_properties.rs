//! Property tests for header name recognition

use proptest::prelude::*;
use siphon_sip_core::header::registry::{self, SipHeader};

fn registered_ci(name: &str) -> Option<SipHeader> {
    SipHeader::ALL
        .iter()
        .copied()
        .find(|h| h.as_str().eq_ignore_ascii_case(name))
}

fn recase(name: &str, flips: &[bool]) -> String {
    name.chars()
        .zip(flips.iter().cycle())
        .map(|(c, &upper)| {
            if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

proptest! {
    /// Every registered name is found under any ASCII casing
    #[test]
    fn prop_registered_names_match_any_case(
        index in 0..SipHeader::ALL.len(),
        flips in proptest::collection::vec(any::<bool>(), 1..32),
    ) {
        let header = SipHeader::ALL[index];
        let name = recase(header.as_str(), &flips);
        prop_assert_eq!(registry::lookup(name.as_bytes()), Some(header));

        let line = format!("{}: value", name);
        prop_assert_eq!(registry::lookahead(line.as_bytes()), Some((header, name.len())));
    }

    /// Arbitrary token strings are recognized exactly when they are registered names
    #[test]
    fn prop_lookup_agrees_with_linear_scan(name in "[A-Za-z][A-Za-z-]{0,30}") {
        prop_assert_eq!(registry::lookup(name.as_bytes()), registered_ci(&name));
    }

    /// A registered name with one character replaced is rejected unless it
    /// happens to spell another registered name
    #[test]
    fn prop_near_misses_are_rejected(
        index in 0..SipHeader::ALL.len(),
        position in any::<prop::sample::Index>(),
        replacement in "[A-Za-z0-9]",
    ) {
        let original = SipHeader::ALL[index].as_str();
        let at = position.index(original.len());
        let mut mutated = original.to_string();
        mutated.replace_range(at..at + 1, &replacement);
        prop_assume!(!mutated.eq_ignore_ascii_case(original));

        prop_assert_eq!(registry::lookup(mutated.as_bytes()), registered_ci(&mutated));
    }

    /// Arbitrary bytes never panic the lookahead
    #[test]
    fn prop_lookahead_total(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        if let Some((header, len)) = registry::lookahead(&data) {
            prop_assert!(header.as_str().as_bytes().eq_ignore_ascii_case(&data[..len]));
        }
    }
}

#[test]
fn test_every_name_has_serialization_prefix() {
    for header in SipHeader::ALL {
        let expected = format!("{}: ", header.as_str());
        assert_eq!(header.bytes_colon_space(), expected.as_bytes());
    }
}

#[test]
fn test_system_headers() {
    let system: Vec<_> = SipHeader::ALL
        .iter()
        .filter(|h| h.is_system())
        .map(|h| h.as_str())
        .collect();
    assert_eq!(
        system,
        vec!["Via", "Route", "Record-Route", "From", "To", "Call-ID", "CSeq", "RAck", "RSeq"]
    );
}
