use std::sync::Arc;

use tokio::time::{sleep, Duration};

use siphon::DefaultHandler;
use siphon_dialog_core::{CoreConfig, SipServer};
use siphon_sip_core::{Method, Request, SipHeader, SipMessage, StatusCode, Via};
use siphon_sip_transport::MemoryTransport;

fn request(method: Method, branch: &str) -> Request {
    Request::builder(method.clone(), "sip:service@example.com".parse().unwrap())
        .header(SipHeader::Via, Via::new("UDP", "192.0.2.10", Some(5060), branch))
        .raw_header(SipHeader::From, "<sip:alice@example.com>;tag=a1")
        .unwrap()
        .raw_header(SipHeader::To, "<sip:service@example.com>")
        .unwrap()
        .header(SipHeader::CallId, format!("{}@192.0.2.10", branch))
        .header(SipHeader::CSeq, format!("1 {}", method))
        .build()
}

#[tokio::test]
async fn test_answers_known_methods() {
    let (transport, events) = MemoryTransport::new("127.0.0.1:5060".parse().unwrap());
    let server = SipServer::new(
        CoreConfig::default(),
        Arc::new(transport.clone()),
        events,
        Arc::new(DefaultHandler),
    )
    .unwrap();
    server.start().unwrap();

    let source = "192.0.2.10:5060".parse().unwrap();
    transport.inject(request(Method::Options, "z9hG4bKopt"), source).await.unwrap();
    transport.inject(request(Method::Message, "z9hG4bKmsg"), source).await.unwrap();
    transport.wait_for_sent(2).await;
    sleep(Duration::from_millis(10)).await;

    let statuses: Vec<(Method, StatusCode)> = transport
        .sent()
        .into_iter()
        .filter_map(|sent| sent.message.into_response())
        .map(|r| (r.cseq().unwrap().method, r.status()))
        .collect();
    assert!(statuses.contains(&(Method::Options, StatusCode::Ok)));
    assert!(statuses.contains(&(Method::Message, StatusCode::NotImplemented)));
    assert!(transport.sent().iter().all(|s| s.destination == source));

    server.shutdown().await.unwrap();
}
