//! Answers inbound OPTIONS probes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use qualify_core::Endpoint;

use crate::dialplan::Dialplan;
use crate::signalling::{
    parse_sip_uri, uri_user, InboundRequest, ProbeReply, ReplyRoute, SignallingClient, PROBE_METHOD,
};
use crate::store::Store;

pub const ACCEPT_ENCODING: &str = "text/plain";
pub const ACCEPT_LANGUAGE: &str = "en";

/// Whether the responder took the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Left for other handlers.
    Declined,
    /// Answered with this status code.
    Replied(u16),
}

pub struct Responder {
    signalling: Arc<dyn SignallingClient>,
    store: Arc<dyn Store>,
    dialplan: Arc<dyn Dialplan>,
    shutting_down: Arc<AtomicBool>,
    user_option_separator: char,
}

impl Responder {
    pub fn new(
        signalling: Arc<dyn SignallingClient>,
        store: Arc<dyn Store>,
        dialplan: Arc<dyn Dialplan>,
        shutting_down: Arc<AtomicBool>,
        user_option_separator: char,
    ) -> Self {
        Self {
            signalling,
            store,
            dialplan,
            shutting_down,
            user_option_separator,
        }
    }

    /// Handle one inbound request.
    pub fn on_request(&self, request: &InboundRequest) -> Disposition {
        if request.method != PROBE_METHOD {
            return Disposition::Declined;
        }

        let Some(endpoint) = request
            .endpoint
            .as_deref()
            .and_then(|name| self.store.endpoint(name))
        else {
            return Disposition::Declined;
        };

        let code = self.decide(request, &endpoint);
        self.send_response(request, &endpoint, code);
        Disposition::Replied(code)
    }

    fn decide(&self, request: &InboundRequest, endpoint: &Endpoint) -> u16 {
        let Some(uri) = parse_sip_uri(&request.uri) else {
            return 416;
        };

        // Match the dialplan without per-user options in the way.
        let user = uri_user(&uri);
        let exten = user
            .split_once(self.user_option_separator)
            .map_or(user, |(exten, _)| exten);

        if self.shutting_down.load(Ordering::Acquire) {
            // Not taking new calls; likely an availability poll.
            503
        } else if !exten.is_empty() && !self.dialplan.exists(&endpoint.context, exten) {
            404
        } else {
            200
        }
    }

    fn send_response(&self, request: &InboundRequest, endpoint: &Endpoint, code: u16) {
        let caps = self.signalling.capabilities();
        let mut headers = Vec::with_capacity(5);
        if let Some(accept) = caps.accept {
            headers.push(("Accept".to_string(), accept));
        }
        if let Some(allow) = caps.allow {
            headers.push(("Allow".to_string(), allow));
        }
        if let Some(supported) = caps.supported {
            headers.push(("Supported".to_string(), supported));
        }
        headers.push(("Accept-Encoding".to_string(), ACCEPT_ENCODING.to_string()));
        headers.push(("Accept-Language".to_string(), ACCEPT_LANGUAGE.to_string()));

        let route = if request.in_dialog && request.in_transaction {
            ReplyRoute::InDialog
        } else {
            ReplyRoute::Endpoint(endpoint.id.clone())
        };

        let reply = ProbeReply {
            code,
            headers,
            route,
        };
        match self.signalling.send_reply(request, reply) {
            Ok(()) => tracing::debug!(endpoint = %endpoint.id, code, "answered OPTIONS"),
            Err(e) => {
                tracing::error!(endpoint = %endpoint.id, code, error = %e, "unable to send OPTIONS response")
            }
        }
    }
}
