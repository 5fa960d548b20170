//! Shared fixtures for the unit tests.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use qualify_core::{Aor, Endpoint};

use crate::engine::ProbeEngine;
use crate::events::EventBus;
use crate::memory_store::MemoryStore;
use crate::metrics::StateGauges;
use crate::pool::WorkerPool;
use crate::scheduler::Scheduler;
use crate::signalling::{
    Capabilities, InboundRequest, ProbeCompletion, ProbeOutcome, ProbeReply, ProbeRequest,
    SignallingClient, SignallingError,
};
use crate::status::{InitialQualifyRx, StatusStore};

/// Records every probe and reply. Probes are answered on the spot with
/// `auto` when set, otherwise kept in `pending`.
pub(crate) struct RecordingSignalling {
    pub sent: Mutex<Vec<ProbeRequest>>,
    pub pending: Mutex<Vec<ProbeCompletion>>,
    pub replies: Mutex<Vec<ProbeReply>>,
    pub auto: Mutex<Option<ProbeOutcome>>,
    pub caps: Mutex<Capabilities>,
}

impl RecordingSignalling {
    pub fn new(auto: Option<ProbeOutcome>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            auto: Mutex::new(auto),
            caps: Mutex::new(Capabilities {
                accept: Some("application/sdp".into()),
                allow: Some("INVITE, BYE".into()),
                supported: None,
            }),
        }
    }

    pub fn sent_to(&self, contact_id: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.contact_id == contact_id)
            .count()
    }

    pub fn total_sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl SignallingClient for RecordingSignalling {
    fn send_probe(
        &self,
        request: ProbeRequest,
        _timeout: Duration,
        completion: ProbeCompletion,
    ) -> Result<(), SignallingError> {
        self.sent.lock().unwrap().push(request);
        let auto = self.auto.lock().unwrap().clone();
        match auto {
            Some(outcome) => completion.complete(outcome),
            None => self.pending.lock().unwrap().push(completion),
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

pub(crate) struct Parts {
    pub store: Arc<MemoryStore>,
    pub signalling: Arc<RecordingSignalling>,
    pub gauges: Arc<StateGauges>,
    pub events: Arc<EventBus>,
    pub statuses: Arc<StatusStore>,
    pub engine: Arc<ProbeEngine>,
    pub pool: Arc<WorkerPool>,
    pub scheduler: Arc<Scheduler>,
    pub booted: Arc<AtomicBool>,
    pub initial_rx: InitialQualifyRx,
}

/// Wire the core pieces together. Must run inside a tokio runtime.
pub(crate) fn parts(auto: Option<ProbeOutcome>, max_initial_qualify_time: u32) -> Parts {
    let store = Arc::new(MemoryStore::new());
    let signalling = Arc::new(RecordingSignalling::new(auto));
    let gauges = Arc::new(StateGauges::new());
    let events = Arc::new(EventBus::new(64));
    let booted = Arc::new(AtomicBool::new(false));
    let (statuses, initial_rx) = StatusStore::new(store.clone(), gauges.clone(), booted.clone());
    let statuses = Arc::new(statuses);
    let engine = Arc::new(ProbeEngine::new(
        store.clone(),
        statuses.clone(),
        signalling.clone(),
        gauges.clone(),
        events.clone(),
    ));
    let pool = Arc::new(WorkerPool::current(4));
    let scheduler = Arc::new(
        Scheduler::new(
            store.clone(),
            engine.clone(),
            pool.clone(),
            max_initial_qualify_time,
        )
        .unwrap(),
    );
    Parts {
        store,
        signalling,
        gauges,
        events,
        statuses,
        engine,
        pool,
        scheduler,
        booted,
        initial_rx,
    }
}

pub(crate) fn endpoint(id: &str, aors: &str, context: &str) -> Endpoint {
    Endpoint {
        id: id.into(),
        aors: aors.into(),
        context: context.into(),
    }
}

pub(crate) fn aor(id: &str, frequency: u32, contacts: &[&str]) -> Aor {
    Aor {
        id: id.into(),
        qualify_frequency: frequency,
        permanent_contacts: contacts.iter().map(|c| c.to_string()).collect(),
        ..Aor::default()
    }
}

/// Poll `check` every 5 ms for up to two seconds.
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
