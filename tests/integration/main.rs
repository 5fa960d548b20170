//! Qualify integration test harness.
//!
//! Scenarios run in-process: a real `Qualifier` over a `MemoryStore`, with
//! a stub signalling client standing in for the SIP stack. Probes are held
//! by the stub until a test resolves them, or answered on the spot when the
//! stub is built with an automatic outcome.
//!
//!   cargo test --test integration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use qualify_core::config::SystemConfig;
use qualify_core::{Aor, Contact, Endpoint};
use qualify_services::{
    Capabilities, InboundRequest, MemoryStore, ProbeCompletion, ProbeOutcome, ProbeReply,
    ProbeRequest, Qualifier, SignallingClient, SignallingError, StaticDialplan,
};

mod admin;
mod lifecycle;
mod probing;
mod scheduling;

// ── Stub signalling ───────────────────────────────────────────────────────────

pub struct StubSignalling {
    sent: Mutex<Vec<ProbeRequest>>,
    held: Mutex<Vec<ProbeCompletion>>,
    replies: Mutex<Vec<ProbeReply>>,
    caps: Mutex<Capabilities>,
    auto: Option<ProbeOutcome>,
    fail_sends: AtomicBool,
}

impl StubSignalling {
    /// Holds every probe until resolved.
    pub fn holding() -> Arc<Self> {
        Arc::new(Self::with_auto(None))
    }

    /// Completes every probe immediately with `outcome`.
    pub fn answering(outcome: ProbeOutcome) -> Arc<Self> {
        Arc::new(Self::with_auto(Some(outcome)))
    }

    fn with_auto(auto: Option<ProbeOutcome>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            caps: Mutex::new(Capabilities {
                accept: Some("application/sdp".into()),
                allow: Some("INVITE, ACK, BYE".into()),
                supported: Some("replaces".into()),
            }),
            auto,
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent_to(&self, contact_id: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.contact_id == contact_id)
            .count()
    }

    pub fn sent(&self) -> Vec<ProbeRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn total_sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Complete every held probe with `outcome`. Returns how many.
    pub fn resolve_all(&self, outcome: ProbeOutcome) -> usize {
        let held = std::mem::take(&mut *self.held.lock().unwrap());
        let count = held.len();
        for completion in held {
            completion.complete(outcome.clone());
        }
        count
    }

    pub fn replies(&self) -> Vec<ProbeReply> {
        self.replies.lock().unwrap().clone()
    }

    pub fn last_reply(&self) -> Option<ProbeReply> {
        self.replies.lock().unwrap().last().cloned()
    }
}

impl SignallingClient for StubSignalling {
    fn send_probe(
        &self,
        request: ProbeRequest,
        _timeout: Duration,
        completion: ProbeCompletion,
    ) -> Result<(), SignallingError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SignallingError::Transport("network unreachable".into()));
        }
        self.sent.lock().unwrap().push(request);
        match &self.auto {
            Some(outcome) => completion.complete(outcome.clone()),
            None => self.held.lock().unwrap().push(completion),
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.caps.lock().unwrap().clone()
    }

    fn add_allow(&self, method: &str) {
        self.caps.lock().unwrap().add_allow(method);
    }

    fn send_reply(&self, _request: &InboundRequest, reply: ProbeReply) -> Result<(), SignallingError> {
        self.replies.lock().unwrap().push(reply);
        Ok(())
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

/// A started qualify service. Shut down on drop.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub signalling: Arc<StubSignalling>,
    pub qualifier: Arc<Qualifier>,
}

impl Harness {
    /// Start over `store` with a holding stub. Dialplan: context `default`
    /// has extension `1000`.
    pub fn start(store: Arc<MemoryStore>) -> Self {
        Self::start_with(store, StubSignalling::holding())
    }

    pub fn start_with(store: Arc<MemoryStore>, signalling: Arc<StubSignalling>) -> Self {
        let mut dialplan = StaticDialplan::default();
        dialplan.add("default", "1000");
        let qualifier = Qualifier::init(
            store.clone(),
            signalling.clone(),
            Arc::new(dialplan),
            &SystemConfig::default(),
        )
        .expect("qualifier should start");
        Self {
            store,
            signalling,
            qualifier,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.qualifier.shutdown();
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Far enough in the future to never expire during a test run.
pub const FAR_FUTURE: u64 = 4_000_000_000;

pub fn endpoint(id: &str, aors: &str, context: &str) -> Endpoint {
    Endpoint {
        id: id.into(),
        aors: aors.into(),
        context: context.into(),
    }
}

pub fn aor(id: &str, frequency: u32, contacts: &[&str]) -> Aor {
    Aor {
        id: id.into(),
        qualify_frequency: frequency,
        permanent_contacts: contacts.iter().map(|c| c.to_string()).collect(),
        ..Aor::default()
    }
}

/// A registered contact of `aor` with its own qualify frequency.
pub fn registered(aor: &str, uri: &str, frequency: u32) -> Contact {
    let mut contact = Contact::dynamic(aor, uri, FAR_FUTURE);
    contact.qualify_frequency = frequency;
    contact
}

/// Poll `check` every 5 ms for up to three seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..600 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
