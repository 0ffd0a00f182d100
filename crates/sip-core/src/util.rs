//! Identifier generation for branches, tags and Call-IDs.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// RFC 3261 §8.1.1.7 branch prefix of compliant stacks
pub const MAGIC_COOKIE: &str = "z9hG4bK";

/// Fresh Via branch: the magic cookie followed by 16 random alphanumerics
pub fn generate_branch() -> String {
    format!("{}{}", MAGIC_COOKIE, random_alphanumeric(16))
}

/// Random tag of 8 lowercase hex digits
pub fn generate_tag() -> String {
    format!("{:08x}", rand::thread_rng().gen::<u32>())
}

/// Random Call-ID, qualified with `host` when given
pub fn generate_call_id(host: Option<&str>) -> String {
    let id = random_alphanumeric(24);
    match host {
        Some(host) => format!("{}@{}", id, host),
        None => id,
    }
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_has_cookie_and_is_unique() {
        let a = generate_branch();
        let b = generate_branch();
        assert!(a.starts_with(MAGIC_COOKIE));
        assert_eq!(a.len(), MAGIC_COOKIE.len() + 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tag_shape() {
        let tag = generate_tag();
        assert_eq!(tag.len(), 8);
        assert!(tag.bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(!tag.contains('-'));
    }

    #[test]
    fn test_call_id_host() {
        assert!(generate_call_id(Some("example.com")).ends_with("@example.com"));
        assert_eq!(generate_call_id(None).len(), 24);
    }
}
