use std::time::Duration;

use siphon_sip_core::prelude::*;
use siphon_sip_transport::prelude::*;
use siphon_sip_transport::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn options_request() -> Request {
    Request::builder(Method::Options, "sip:bob@127.0.0.1".parse().unwrap())
        .header(SipHeader::Via, Via::new("UDP", "127.0.0.1", None, generate_branch()))
        .raw_header(SipHeader::From, "<sip:alice@127.0.0.1>;tag=abc")
        .unwrap()
        .raw_header(SipHeader::To, "<sip:bob@127.0.0.1>")
        .unwrap()
        .header(SipHeader::CallId, "udp-test-1")
        .header(SipHeader::CSeq, "1 OPTIONS")
        .build()
}

#[tokio::test]
async fn test_udp_send_and_receive() {
    let (a, _a_rx) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let (b, mut b_rx) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let b_addr = b.local_addr().unwrap();

    a.send_message(options_request().into(), b_addr).await.unwrap();

    let event = timeout(Duration::from_secs(2), b_rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    match event {
        TransportEvent::MessageReceived {
            message,
            source,
            destination,
        } => {
            assert_eq!(source, a.local_addr().unwrap());
            assert_eq!(destination, b_addr);
            assert_eq!(message.call_id(), Some("udp-test-1"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_udp_reports_garbage_and_ignores_keepalives() {
    let (t, mut rx) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = t.local_addr().unwrap();

    raw.send_to(b"\r\n\r\n", addr).await.unwrap();
    raw.send_to(b"definitely not SIP", addr).await.unwrap();

    let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(event, TransportEvent::Error { .. }));
}

#[tokio::test]
async fn test_udp_close() {
    let (t, mut rx) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    t.close().await.unwrap();
    assert!(t.is_closed());

    let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(event, TransportEvent::Closed));

    let err = t
        .send_message(options_request().into(), "127.0.0.1:5060".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TransportClosed));
}

#[tokio::test]
async fn test_memory_transport_records_and_injects() {
    let (t, mut rx) = MemoryTransport::new("10.0.0.1:5060".parse().unwrap());
    let peer = "10.0.0.2:5060".parse().unwrap();

    t.send_message(options_request().into(), peer).await.unwrap();
    t.wait_for_sent(1).await;
    let sent = t.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, peer);
    assert_eq!(t.sent_count(), 0);

    t.set_fail_sends(true);
    assert!(t.send_message(options_request().into(), peer).await.is_err());

    t.inject(options_request(), peer).await.unwrap();
    match rx.recv().await.unwrap() {
        TransportEvent::MessageReceived { source, .. } => assert_eq!(source, peer),
        other => panic!("unexpected event {:?}", other),
    }
}
