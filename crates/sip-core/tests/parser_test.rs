//! Wire parsing and serialization of complete messages

use siphon_sip_core::prelude::*;

const INVITE: &[u8] = b"INVITE sip:bob@biloxi.com SIP/2.0\r\n\
Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds, SIP/2.0/UDP proxy.atlanta.com;branch=z9hG4bKnashds8\r\n\
Max-Forwards: 70\r\n\
To: Bob <sip:bob@biloxi.com>\r\n\
From: \"Alice\" <sip:alice@atlanta.com>;tag=1928301774\r\n\
Call-ID: a84b4c76e66710@pc33.atlanta.com\r\n\
CSeq: 314159 INVITE\r\n\
Contact: <sip:alice@pc33.atlanta.com>\r\n\
Subject: lunch\r\n\ttomorrow\r\n\
Content-Type: application/sdp\r\n\
Content-Length: 4\r\n\
\r\n\
v=0\n";

#[test]
fn test_parse_invite() {
    let message = parse_message(INVITE).unwrap();
    let request = message.as_request().unwrap();

    assert_eq!(request.method(), &Method::Invite);
    assert_eq!(request.uri().user(), Some("bob"));
    assert_eq!(request.call_id(), Some("a84b4c76e66710@pc33.atlanta.com"));
    assert_eq!(request.cseq(), Some(CSeq::new(314159, Method::Invite)));
    assert_eq!(request.from_tag(), Some("1928301774"));
    assert_eq!(request.to_tag(), None);
    assert!(request.is_initial());

    let branches: Vec<_> = request.core().vias().filter_map(Via::branch).collect();
    assert_eq!(branches, vec!["z9hG4bK776asdhds", "z9hG4bKnashds8"]);
    assert_eq!(request.branch(), Some("z9hG4bK776asdhds"));

    assert_eq!(
        request.headers().get("subject").and_then(HeaderValue::as_text),
        Some("lunch tomorrow")
    );
    assert_eq!(&request.body()[..], b"v=0\n");
}

#[test]
fn test_parse_response_with_compact_headers() {
    let raw = b"SIP/2.0 180 Ringing\r\n\
v: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n\
t: <sip:bob@biloxi.com>;tag=8321234356\r\n\
f: <sip:alice@atlanta.com>;tag=1928301774\r\n\
i: a84b4c76e66710\r\n\
CSeq: 314159 INVITE\r\n\
l: 0\r\n\r\n";

    let message = parse_message(raw).unwrap();
    let response = message.as_response().unwrap();
    assert_eq!(response.status(), StatusCode::Ringing);
    assert_eq!(response.to_tag(), Some("8321234356"));
    assert_eq!(response.call_id(), Some("a84b4c76e66710"));
    assert!(response.body().is_empty());
}

#[test]
fn test_round_trip_through_serializer() {
    let first = parse_message(INVITE).unwrap();
    let bytes = first.to_bytes();
    let second = parse_message(&bytes).unwrap();

    let a = first.as_request().unwrap();
    let b = second.as_request().unwrap();
    assert_eq!(a.method(), b.method());
    assert_eq!(a.uri(), b.uri());
    assert_eq!(a.headers(), b.headers());
    assert_eq!(a.body(), b.body());

    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("\r\nContent-Length: 4\r\n\r\nv=0\n"));
}

#[test]
fn test_missing_mandatory_headers() {
    let raw = b"OPTIONS sip:bob@biloxi.com SIP/2.0\r\n\
Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK1\r\n\
To: <sip:bob@biloxi.com>\r\n\
From: <sip:alice@atlanta.com>;tag=1\r\n\
CSeq: 1 OPTIONS\r\n\r\n";
    assert_eq!(parse_message(raw).unwrap_err(), Error::MissingHeader("Call-ID"));
}

#[test]
fn test_cseq_method_must_match() {
    let raw = b"BYE sip:bob@biloxi.com SIP/2.0\r\n\
Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK1\r\n\
To: <sip:bob@biloxi.com>;tag=2\r\n\
From: <sip:alice@atlanta.com>;tag=1\r\n\
Call-ID: x\r\n\
CSeq: 1 INVITE\r\n\r\n";
    assert!(matches!(
        parse_message(raw),
        Err(Error::InvalidHeader { .. })
    ));
}

#[test]
fn test_malformed_inputs_are_rejected() {
    assert!(parse_message(b"").is_err());
    assert!(parse_message(b"\r\n\r\n").is_err());
    assert!(parse_message(b"NOT A SIP MESSAGE\r\n\r\n").is_err());
    // headers never terminated
    assert!(parse_message(b"OPTIONS sip:a@b SIP/2.0\r\nVia: SIP/2.0/UDP h").is_err());

    // body shorter than Content-Length
    let raw = b"MESSAGE sip:bob@biloxi.com SIP/2.0\r\n\
Via: SIP/2.0/UDP h;branch=z9hG4bK1\r\n\
To: <sip:bob@biloxi.com>\r\n\
From: <sip:alice@atlanta.com>;tag=1\r\n\
Call-ID: x\r\n\
CSeq: 1 MESSAGE\r\n\
Content-Length: 50\r\n\r\nshort";
    assert!(parse_message(raw).is_err());

    // a system header that does not parse
    let raw = b"OPTIONS sip:bob@biloxi.com SIP/2.0\r\n\
Via: garbage\r\n\
To: <sip:bob@biloxi.com>\r\n\
From: <sip:alice@atlanta.com>;tag=1\r\n\
Call-ID: x\r\n\
CSeq: 1 OPTIONS\r\n\r\n";
    assert!(matches!(
        parse_message(raw),
        Err(Error::InvalidHeader { .. })
    ));
}

#[test]
fn test_unparseable_extension_values_fall_back_to_text() {
    let raw = b"REGISTER sip:registrar.biloxi.com SIP/2.0\r\n\
Via: SIP/2.0/UDP bobspc.biloxi.com:5060;branch=z9hG4bKnashds7\r\n\
To: Bob <sip:bob@biloxi.com>\r\n\
From: Bob <sip:bob@biloxi.com>;tag=456248\r\n\
Call-ID: 843817637684230@998sdasdh09\r\n\
CSeq: 1826 REGISTER\r\n\
Contact: *\r\n\
Expires: 0\r\n\r\n";
    let message = parse_message(raw).unwrap();
    let contact = message.headers().get(SipHeader::Contact).unwrap();
    assert_eq!(contact.as_text(), Some("*"));
}
