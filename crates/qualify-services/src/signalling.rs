//! Signalling client contract: send a probe with a timeout and get exactly one
//! terminal outcome back, plus the reply path used by the responder.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use qualify_core::{Contact, Endpoint};

/// Probe request method.
pub const PROBE_METHOD: &str = "OPTIONS";

/// Parse `text` as a `sip:` or `sips:` URI. Surrounding angle brackets, as
/// found in name-addr headers and configured proxies, are tolerated.
pub fn parse_sip_uri(text: &str) -> Option<rsip::Uri> {
    let text = text.trim();
    let text = text
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(text);
    let uri = rsip::Uri::try_from(text).ok()?;
    matches!(uri.scheme, Some(rsip::Scheme::Sip) | Some(rsip::Scheme::Sips)).then_some(uri)
}

/// User part of `uri`, empty when it has none.
pub fn uri_user(uri: &rsip::Uri) -> &str {
    uri.auth.as_ref().map(|auth| auth.user.as_str()).unwrap_or("")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignallingError {
    #[error("failed to build request: {0}")]
    Build(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("signalling client closed")]
    Closed,
}

/// Terminal outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Any final response arrived.
    Response { code: u16 },
    /// No response within the probe timeout.
    Timeout,
    TransportError,
    /// Anything the client could not classify.
    Other(String),
}

/// An outbound probe, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub contact_id: String,
    pub endpoint: String,
    /// Request-URI.
    pub uri: String,
    /// Next hop when set, otherwise the request-URI host.
    pub outbound_proxy: Option<String>,
}

/// Owning callback token for one in-flight probe.
///
/// Moved into the signalling client on dispatch and consumed by
/// [`complete`](Self::complete). Dropping it without completing releases the
/// contact reference and records nothing.
pub struct ProbeCompletion {
    contact: Arc<Contact>,
    on_complete: Box<dyn FnOnce(Arc<Contact>, ProbeOutcome) + Send + Sync>,
}

impl ProbeCompletion {
    pub fn new(
        contact: Arc<Contact>,
        on_complete: impl FnOnce(Arc<Contact>, ProbeOutcome) + Send + Sync + 'static,
    ) -> Self {
        Self {
            contact,
            on_complete: Box::new(on_complete),
        }
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    /// Deliver the terminal outcome.
    pub fn complete(self, outcome: ProbeOutcome) {
        (self.on_complete)(self.contact, outcome)
    }
}

impl fmt::Debug for ProbeCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeCompletion")
            .field("contact", &self.contact.id)
            .finish_non_exhaustive()
    }
}

/// Capability headers the stack advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub accept: Option<String>,
    pub allow: Option<String>,
    pub supported: Option<String>,
}

impl Capabilities {
    /// Append `method` to `allow` unless already listed.
    pub fn add_allow(&mut self, method: &str) {
        match &mut self.allow {
            Some(allow) => {
                let listed = allow
                    .split(',')
                    .any(|m| m.trim().eq_ignore_ascii_case(method));
                if !listed {
                    if !allow.trim().is_empty() {
                        allow.push_str(", ");
                    }
                    allow.push_str(method);
                }
            }
            None => self.allow = Some(method.to_string()),
        }
    }
}

/// An inbound request as seen by the responder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundRequest {
    pub method: String,
    /// Request-URI text.
    pub uri: String,
    /// Endpoint the stack identified the caller as.
    pub endpoint: Option<String>,
    pub in_dialog: bool,
    pub in_transaction: bool,
    pub source: Option<SocketAddr>,
    /// Headers the reply must echo (Via, From, To, Call-ID, CSeq).
    pub headers: Vec<(String, String)>,
}

impl InboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// How a reply leaves the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyRoute {
    /// Through the request's dialog and transaction.
    InDialog,
    /// Statefully through the identified endpoint.
    Endpoint(String),
}

/// Reply to an inbound probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReply {
    pub code: u16,
    pub headers: Vec<(String, String)>,
    pub route: ReplyRoute,
}

impl ProbeReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The signalling stack as the prober consumes it.
pub trait SignallingClient: Send + Sync {
    /// Build a probe addressed at `contact` on behalf of `endpoint`.
    fn create_probe(
        &self,
        endpoint: &Endpoint,
        contact: &Contact,
    ) -> Result<ProbeRequest, SignallingError> {
        if parse_sip_uri(&contact.uri).is_none() {
            return Err(SignallingError::Build(format!(
                "unparsable contact uri '{}'",
                contact.uri
            )));
        }
        Ok(ProbeRequest {
            contact_id: contact.id.clone(),
            endpoint: endpoint.id.clone(),
            uri: contact.uri.clone(),
            outbound_proxy: None,
        })
    }

    fn apply_outbound_proxy(
        &self,
        request: &mut ProbeRequest,
        proxy: &str,
    ) -> Result<(), SignallingError> {
        if parse_sip_uri(proxy).is_none() {
            return Err(SignallingError::Build(format!(
                "unparsable outbound proxy '{proxy}'"
            )));
        }
        request.outbound_proxy = Some(proxy.to_string());
        Ok(())
    }

    /// Send out of dialog. On `Ok` the client must eventually call
    /// `completion.complete` exactly once; on `Err` it must drop it.
    fn send_probe(
        &self,
        request: ProbeRequest,
        timeout: Duration,
        completion: ProbeCompletion,
    ) -> Result<(), SignallingError>;

    fn capabilities(&self) -> Capabilities;

    /// Add a method to the advertised Allow capability.
    fn add_allow(&self, method: &str);

    fn send_reply(&self, request: &InboundRequest, reply: ProbeReply)
        -> Result<(), SignallingError>;
}
