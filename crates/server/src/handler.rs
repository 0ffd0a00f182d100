use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use siphon_dialog_core::prelude::*;
use siphon_sip_core::{Method, Request, SipMessage, StatusCode};

/// Answers OPTIONS, INVITE and BYE with 200 and everything else with 501
#[derive(Debug, Default)]
pub struct DefaultHandler;

impl DefaultHandler {
    fn status_for(method: &Method) -> StatusCode {
        match method {
            Method::Options | Method::Invite | Method::Bye => StatusCode::Ok,
            _ => StatusCode::NotImplemented,
        }
    }
}

#[async_trait]
impl SipHandler for DefaultHandler {
    async fn handle_request(&self, request: ServerRequest) -> DialogResult<()> {
        let status = Self::status_for(request.method());
        debug!(
            method = %request.method(),
            source = %request.source(),
            session = %request.session().key(),
            status = %status,
            "Answering request"
        );
        if request.method() == &Method::Invite && request.is_initial() {
            info!(
                app_id = %request.application_session().id(),
                call_id = %request.session().call_id(),
                "Accepting call"
            );
        }
        request.respond(status)
    }

    async fn handle_ack(&self, request: Request, session: Arc<Session>) {
        debug!(session = %session.key(), cseq = ?request.cseq().map(|c| c.seq), "Call confirmed by ACK");
    }
}
