//! UDP SIP transport: sends OPTIONS probes, matches their responses by
//! Call-ID, and hands inbound requests to the responder.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use rsip::prelude::*;
use rsip::{Header, Headers, Method, SipMessage};

use qualify_core::config::SipConfig;
use qualify_services::signalling::{parse_sip_uri, uri_user};
use qualify_services::{
    Capabilities, Disposition, InboundRequest, ProbeCompletion, ProbeOutcome, ProbeReply,
    ProbeRequest, Qualifier, ReplyRoute, SignallingClient, SignallingError, Store, PROBE_METHOD,
};

/// Retransmit interval bounds for requests over UDP (RFC 3261 T1 / T2).
const T1: Duration = Duration::from_millis(500);
const T2: Duration = Duration::from_secs(4);

const DEFAULT_PORT: u16 = 5060;
const MAX_DATAGRAM: usize = 65_535;

struct PendingProbe {
    completion: ProbeCompletion,
    timer: Option<AbortHandle>,
}

pub struct UdpSignalling {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    handle: Handle,
    user_agent: String,
    caps: Mutex<Capabilities>,
    pending: Arc<DashMap<String, PendingProbe>>,
    cseq: AtomicU32,
}

impl UdpSignalling {
    /// Bind the SIP socket. Must be called from inside a tokio runtime.
    pub async fn bind(config: &SipConfig) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(&config.bind)
            .await
            .with_context(|| format!("failed to bind SIP socket on {}", config.bind))?;
        let local = socket.local_addr()?;
        tracing::info!(addr = %local, "SIP transport bound");

        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            local,
            handle: Handle::current(),
            user_agent: config.user_agent.clone(),
            caps: Mutex::new(Capabilities {
                accept: non_empty(&config.accept),
                allow: non_empty(&config.allow),
                supported: non_empty(&config.supported),
            }),
            pending: Arc::new(DashMap::new()),
            cseq: AtomicU32::new(1),
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Probes still waiting for a final response.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    // ── Receive loop ─────────────────────────────────────────────────────────

    pub async fn run(
        self: Arc<Self>,
        qualifier: Arc<Qualifier>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("SIP transport shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };
                    let msg = match SipMessage::try_from(&buf[..len]) {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::debug!(peer = %peer, error = %e, "dropping unparsable datagram");
                            continue;
                        }
                    };
                    match msg {
                        SipMessage::Response(response) => self.on_response(&response),
                        SipMessage::Request(request) => self.on_request(&qualifier, request, peer),
                    }
                }
            }
        }
    }

    fn on_response(&self, response: &rsip::Response) {
        let Ok(call_id) = response.call_id_header() else {
            return;
        };
        let call_id = call_id.value();
        let code = response.status_code.code();
        if code < 200 {
            tracing::trace!(call_id, code, "provisional response");
            return;
        }
        match self.pending.remove(call_id) {
            Some((_, probe)) => {
                if let Some(timer) = probe.timer {
                    timer.abort();
                }
                probe.completion.complete(ProbeOutcome::Response { code });
            }
            None => tracing::trace!(call_id, code, "response for unknown transaction"),
        }
    }

    fn on_request(&self, qualifier: &Qualifier, sip: rsip::Request, peer: SocketAddr) {
        if sip.method == Method::Ack {
            return;
        }
        let in_dialog = sip
            .to_header()
            .ok()
            .and_then(|to| to.typed().ok())
            .is_some_and(|to| has_tag(&to.params));
        let request = InboundRequest {
            method: sip.method.to_string(),
            uri: sip.uri.to_string(),
            endpoint: identify_endpoint(qualifier.store().as_ref(), &sip),
            in_dialog,
            in_transaction: true,
            source: Some(peer),
            headers: header_pairs(&sip.headers),
        };

        if let Disposition::Replied(code) = qualifier.responder().on_request(&request) {
            tracing::debug!(peer = %peer, method = %request.method, code, "request answered");
            return;
        }

        // Nobody else handles requests in this daemon.
        let code = if request.method == PROBE_METHOD { 403 } else { 501 };
        tracing::debug!(peer = %peer, method = %request.method, code, "request declined");
        let reply = ProbeReply {
            code,
            headers: Vec::new(),
            route: ReplyRoute::InDialog,
        };
        if let Err(e) = self.send_reply(&request, reply) {
            tracing::warn!(peer = %peer, error = %e, "failed to reject request");
        }
    }

    // ── Outbound probes ──────────────────────────────────────────────────────

    fn build_options(
        &self,
        uri: rsip::Uri,
        proxy: Option<rsip::Uri>,
        call_id: &str,
    ) -> rsip::Request {
        let local = self.local;
        let cseq = self.cseq.fetch_add(1, Ordering::Relaxed);
        let ours = rsip::Uri {
            scheme: Some(rsip::Scheme::Sip),
            auth: Some(rsip::Auth {
                user: "qualify".into(),
                password: None,
            }),
            host_with_port: rsip::HostWithPort {
                host: rsip::Host::IpAddr(local.ip()),
                port: Some(local.port().into()),
            },
            ..Default::default()
        };

        let mut headers: Vec<Header> = vec![
            Header::Via(format!("SIP/2.0/UDP {local};rport;branch=z9hG4bK{}", random_token(8)).into()),
            Header::MaxForwards("70".to_string().into()),
            Header::From(
                rsip::typed::From {
                    display_name: None,
                    uri: ours.clone(),
                    params: vec![rsip::Param::Tag(rsip::param::Tag::new(random_token(4)))],
                }
                .into(),
            ),
            Header::To(
                rsip::typed::To {
                    display_name: None,
                    uri: uri.clone(),
                    params: Vec::new(),
                }
                .into(),
            ),
            Header::Contact(
                rsip::typed::Contact {
                    display_name: None,
                    uri: ours,
                    params: Vec::new(),
                }
                .into(),
            ),
            Header::CallId(call_id.to_string().into()),
            Header::CSeq(
                rsip::typed::CSeq {
                    seq: cseq,
                    method: Method::Options,
                }
                .into(),
            ),
        ];
        if let Some(mut proxy) = proxy {
            if !proxy.params.iter().any(|p| matches!(p, rsip::Param::Lr)) {
                proxy.params.push(rsip::Param::Lr);
            }
            headers.push(Header::Route(format!("<{proxy}>").into()));
        }
        if !self.user_agent.is_empty() {
            headers.push(Header::UserAgent(self.user_agent.clone().into()));
        }
        headers.push(Header::ContentLength("0".to_string().into()));

        rsip::Request {
            method: Method::Options,
            uri,
            version: rsip::Version::V2,
            headers: Headers::from(headers),
            body: Vec::new(),
        }
    }

    /// Send `bytes` to host:port with UDP retransmits until a final response
    /// removes the pending entry or `timeout` elapses.
    async fn transmit(
        socket: Arc<UdpSocket>,
        pending: Arc<DashMap<String, PendingProbe>>,
        call_id: String,
        host: String,
        port: u16,
        bytes: Vec<u8>,
        timeout: Duration,
    ) {
        let deadline = Instant::now() + timeout;
        let target = match tokio::net::lookup_host((host.as_str(), port)).await {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                tracing::debug!(host = %host, error = %e, "probe target did not resolve");
                None
            }
        };
        let Some(target) = target else {
            settle(&pending, &call_id, ProbeOutcome::TransportError);
            return;
        };

        let mut interval = T1;
        loop {
            if let Err(e) = socket.send_to(&bytes, target).await {
                tracing::debug!(target = %target, error = %e, "probe send failed");
                settle(&pending, &call_id, ProbeOutcome::TransportError);
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
            if Instant::now() >= deadline || !pending.contains_key(&call_id) {
                break;
            }
            interval = (interval * 2).min(T2);
        }
        settle(&pending, &call_id, ProbeOutcome::Timeout);
    }
}

fn settle(pending: &DashMap<String, PendingProbe>, call_id: &str, outcome: ProbeOutcome) {
    if let Some((_, probe)) = pending.remove(call_id) {
        probe.completion.complete(outcome);
    }
}

impl SignallingClient for UdpSignalling {
    fn send_probe(
        &self,
        request: ProbeRequest,
        timeout: Duration,
        completion: ProbeCompletion,
    ) -> Result<(), SignallingError> {
        let uri = parse_sip_uri(&request.uri).ok_or_else(|| {
            SignallingError::Build(format!("not a SIP request uri '{}'", request.uri))
        })?;
        let proxy = match request.outbound_proxy.as_deref() {
            Some(text) => Some(parse_sip_uri(text).ok_or_else(|| {
                SignallingError::Build(format!("not a SIP outbound proxy '{text}'"))
            })?),
            None => None,
        };
        let next_hop = proxy.as_ref().unwrap_or(&uri).host_with_port.clone();
        let host = next_hop.host.to_string();
        let port = next_hop.port.map_or(DEFAULT_PORT, |port| *port.value());

        let call_id = format!("{}@{}", random_token(12), self.local.ip());
        let bytes = self.build_options(uri, proxy, &call_id).to_string().into_bytes();
        tracing::trace!(contact = %request.contact_id, call_id = %call_id, "sending OPTIONS");

        self.pending.insert(
            call_id.clone(),
            PendingProbe {
                completion,
                timer: None,
            },
        );
        let task = self.handle.spawn(Self::transmit(
            self.socket.clone(),
            self.pending.clone(),
            call_id.clone(),
            host,
            port,
            bytes,
            timeout,
        ));
        match self.pending.get_mut(&call_id) {
            Some(mut probe) => probe.timer = Some(task.abort_handle()),
            // Already answered.
            None => task.abort(),
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn add_allow(&self, method: &str) {
        self.caps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .add_allow(method);
    }

    fn send_reply(&self, request: &InboundRequest, reply: ProbeReply) -> Result<(), SignallingError> {
        let dest = request
            .source
            .ok_or_else(|| SignallingError::Transport("request has no source address".into()))?;

        let mut headers: Vec<Header> = request
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("Via"))
            .map(|(_, value)| Header::Via(value.clone().into()))
            .collect();
        if let Some(from) = request.header("From") {
            headers.push(Header::From(from.to_string().into()));
        }
        if let Some(to) = request.header("To") {
            let to = rsip::headers::To::from(to.to_string());
            let tagged = to.typed().is_ok_and(|typed| has_tag(&typed.params));
            let to = if tagged {
                to
            } else {
                format!("{};tag={}", to.value(), random_token(4)).into()
            };
            headers.push(Header::To(to));
        }
        if let Some(call_id) = request.header("Call-ID") {
            headers.push(Header::CallId(call_id.to_string().into()));
        }
        if let Some(cseq) = request.header("CSeq") {
            headers.push(Header::CSeq(cseq.to_string().into()));
        }
        headers.extend(
            reply
                .headers
                .into_iter()
                .map(|(name, value)| Header::Other(name, value)),
        );
        if !self.user_agent.is_empty() {
            headers.push(Header::Server(self.user_agent.clone().into()));
        }
        headers.push(Header::ContentLength("0".to_string().into()));

        let response = rsip::Response {
            status_code: reply.code.into(),
            version: rsip::Version::V2,
            headers: Headers::from(headers),
            body: Vec::new(),
        };

        tracing::trace!(dest = %dest, code = reply.code, route = ?reply.route, "sending response");
        self.socket
            .try_send_to(response.to_string().as_bytes(), dest)
            .map(|_| ())
            .map_err(|e| SignallingError::Transport(e.to_string()))
    }
}

/// Endpoint named by the user part of the From URI, if one exists.
fn identify_endpoint(store: &dyn Store, request: &rsip::Request) -> Option<String> {
    let from = request.from_header().ok()?.typed().ok()?;
    store.endpoint(uri_user(&from.uri)).map(|endpoint| endpoint.id)
}

fn has_tag(params: &[rsip::Param]) -> bool {
    params.iter().any(|param| matches!(param, rsip::Param::Tag(_)))
}

/// Header name and value pairs in wire order.
fn header_pairs(headers: &Headers) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|header| {
            let text = header.to_string();
            let (name, value) = text.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn random_token(bytes: usize) -> String {
    let raw: Vec<u8> = (0..bytes).map(|_| rand::random::<u8>()).collect();
    hex::encode(raw)
}
