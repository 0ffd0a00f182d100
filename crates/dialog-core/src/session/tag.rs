//! Application id embedding in local tags
//!
//! Every local tag this server generates has the form `<app-id>-<random>`, where
//! `<app-id>` is the id of the owning application session. Application ids are
//! UUID v4 in simple form (32 lowercase hex digits), so they never contain the
//! delimiter and the id of an in-dialog request can be recovered from its To tag
//! alone.
//!
//! A request may also name its application session explicitly with an `appid`
//! parameter on the Request-URI, which takes precedence over the tag.

use rand::Rng;
use uuid::Uuid;

use siphon_sip_core::{Request, SipMessage};

/// Separates the application id from the random part of a local tag
pub const APP_ID_DELIMITER: char = '-';

/// Request-URI parameter carrying an explicit application id
pub const APP_ID_PARAM: &str = "appid";

/// New application session id
pub fn generate_app_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Local tag embedding `app_id`
pub fn generate_local_tag(app_id: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}{}{:08x}", app_id, APP_ID_DELIMITER, suffix)
}

/// Application id embedded in a tag: everything before the first delimiter,
/// or the whole tag when there is none
pub fn extract_app_id(tag: &str) -> &str {
    match tag.find(APP_ID_DELIMITER) {
        Some(i) => &tag[..i],
        None => tag,
    }
}

/// Application id of an in-dialog request: the `appid` URI parameter if
/// present, otherwise the prefix of the To tag
pub fn request_app_id(request: &Request) -> Option<&str> {
    if let Some(id) = request.uri().param(APP_ID_PARAM).filter(|id| !id.is_empty()) {
        return Some(id);
    }
    request.to_tag().map(extract_app_id).filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use siphon_sip_core::{Method, SipHeader, Via};

    #[test]
    fn test_tag_round_trip() {
        for _ in 0..32 {
            let app_id = generate_app_id();
            assert_eq!(app_id.len(), 32);
            assert!(!app_id.contains(APP_ID_DELIMITER));
            let tag = generate_local_tag(&app_id);
            assert!(tag.starts_with(&format!("{}-", app_id)));
            assert_eq!(extract_app_id(&tag), app_id);
        }
    }

    #[test]
    fn test_extract_without_delimiter() {
        assert_eq!(extract_app_id("abcdef"), "abcdef");
        assert_eq!(extract_app_id("abc-def-ghi"), "abc");
        assert_eq!(extract_app_id("-x"), "");
    }

    fn bye(uri: &str, to: &str) -> Request {
        Request::builder(Method::Bye, uri.parse().unwrap())
            .header(SipHeader::Via, Via::new("UDP", "client.example.com", None, "z9hG4bKbye1"))
            .raw_header(SipHeader::From, "<sip:alice@example.com>;tag=a1")
            .unwrap()
            .raw_header(SipHeader::To, to)
            .unwrap()
            .header(SipHeader::CallId, "call-1")
            .header(SipHeader::CSeq, "2 BYE")
            .build()
    }

    #[test]
    fn test_request_app_id_prefers_uri_param() {
        let request = bye("sip:bob@example.com;appid=explicit", "<sip:bob@example.com>;tag=fromtag-1234");
        assert_eq!(request_app_id(&request), Some("explicit"));

        let request = bye("sip:bob@example.com", "<sip:bob@example.com>;tag=fromtag-1234");
        assert_eq!(request_app_id(&request), Some("fromtag"));

        let request = bye("sip:bob@example.com", "<sip:bob@example.com>");
        assert_eq!(request_app_id(&request), None);
    }
}
