//! The qualify service handle: owns every process-wide piece (scheduler,
//! worker pool, creation lock, observers) between `init` and `shutdown`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use qualify_core::config::SystemConfig;
use qualify_core::Contact;

use crate::admin::Admin;
use crate::dialplan::Dialplan;
use crate::endpoint_state::update_all_unqualified_endpoints;
use crate::engine::ProbeEngine;
use crate::events::EventBus;
use crate::metrics::StateGauges;
use crate::observer::{aor_observer, contact_observer, reconcile_all};
use crate::pool::WorkerPool;
use crate::responder::Responder;
use crate::scheduler::Scheduler;
use crate::signalling::{SignallingClient, PROBE_METHOD};
use crate::status::{InitialQualifyRx, StatusStore};
use crate::store::{ObserverId, Store};

pub struct Qualifier {
    store: Arc<dyn Store>,
    statuses: Arc<StatusStore>,
    engine: Arc<ProbeEngine>,
    scheduler: Arc<Scheduler>,
    pool: Arc<WorkerPool>,
    responder: Responder,
    admin: Admin,
    gauges: Arc<StateGauges>,
    events: Arc<EventBus>,
    booted: Arc<AtomicBool>,
    shutting_down: Arc<AtomicBool>,
    observers: Mutex<Vec<ObserverId>>,
    initial_qualify: Mutex<Option<JoinHandle<()>>>,
}

impl Qualifier {
    /// Start qualifying. Must be called from inside a tokio runtime.
    ///
    /// Registers OPTIONS in the advertised Allow set, installs the contact
    /// and AOR observers, marks unqualified endpoints online and schedules
    /// every qualified contact.
    pub fn init(
        store: Arc<dyn Store>,
        signalling: Arc<dyn SignallingClient>,
        dialplan: Arc<dyn Dialplan>,
        config: &SystemConfig,
    ) -> std::io::Result<Arc<Self>> {
        signalling.add_allow(PROBE_METHOD);

        let gauges = Arc::new(StateGauges::new());
        let events = Arc::new(EventBus::default());
        let booted = Arc::new(AtomicBool::new(false));
        let shutting_down = Arc::new(AtomicBool::new(false));

        let (statuses, initial_rx) = StatusStore::new(store.clone(), gauges.clone(), booted.clone());
        let statuses = Arc::new(statuses);
        let engine = Arc::new(ProbeEngine::new(
            store.clone(),
            statuses.clone(),
            signalling.clone(),
            gauges.clone(),
            events.clone(),
        ));
        let pool = Arc::new(WorkerPool::current(config.worker_limit as usize));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            engine.clone(),
            pool.clone(),
            config.max_initial_qualify_time,
        )?);
        let responder = Responder::new(
            signalling,
            store.clone(),
            dialplan,
            shutting_down.clone(),
            config.user_option_separator,
        );
        let admin = Admin::new(store.clone(), engine.clone(), scheduler.clone(), pool.clone());

        let initial_qualify = tokio::spawn(run_initial_qualify(
            initial_rx,
            store.clone(),
            scheduler.clone(),
        ));

        let observers = vec![
            store.observe_contacts(contact_observer(
                scheduler.clone(),
                engine.clone(),
                statuses.clone(),
            )),
            store.observe_aors(aor_observer(store.clone(), scheduler.clone())),
        ];

        let qualifier = Arc::new(Self {
            store,
            statuses,
            engine,
            scheduler,
            pool,
            responder,
            admin,
            gauges,
            events,
            booted,
            shutting_down,
            observers: Mutex::new(observers),
            initial_qualify: Mutex::new(Some(initial_qualify)),
        });

        update_all_unqualified_endpoints(qualifier.store.as_ref());
        reconcile_all(qualifier.store.as_ref(), &qualifier.scheduler);
        tracing::info!("qualify service started");
        Ok(qualifier)
    }

    /// From now on, newly created permanent contacts get an initial qualify.
    pub fn mark_fully_booted(&self) {
        self.booted.store(true, Ordering::Release);
    }

    pub fn is_fully_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    /// Bulk reload: rebuild the schedule and re-mark unqualified endpoints.
    pub fn reload(&self) -> usize {
        update_all_unqualified_endpoints(self.store.as_ref());
        reconcile_all(self.store.as_ref(), &self.scheduler);
        self.scheduler.len()
    }

    /// Inbound probes get 503 from now on.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stop qualifying: remove the observers, stop the scheduler, then close
    /// the worker pool. Idempotent.
    pub fn shutdown(&self) {
        self.begin_shutdown();
        let observers = std::mem::take(
            &mut *self
                .observers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for id in observers {
            self.store.remove_observer(id);
        }
        self.scheduler.stop();
        self.pool.close();
        if let Some(task) = self
            .initial_qualify
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
        tracing::info!("qualify service stopped");
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn statuses(&self) -> &Arc<StatusStore> {
        &self.statuses
    }

    pub fn engine(&self) -> &Arc<ProbeEngine> {
        &self.engine
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub fn admin(&self) -> &Admin {
        &self.admin
    }

    pub fn gauges(&self) -> &Arc<StateGauges> {
        &self.gauges
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}

/// Qualify permanent contacts created after boot, with their AOR's
/// parameters, outside the status creation lock. Contacts already on the
/// schedule have a qualify of their own underway and are left alone.
async fn run_initial_qualify(
    mut rx: InitialQualifyRx,
    store: Arc<dyn Store>,
    scheduler: Arc<Scheduler>,
) {
    while let Some(contact) = rx.recv().await {
        if scheduler.is_scheduled(&contact.id) {
            tracing::trace!(contact = %contact.id, "already scheduled, skipping initial qualify");
            continue;
        }
        let Some(aor) = store.aor(&contact.aor) else {
            tracing::debug!(contact = %contact.id, "no aor for new permanent contact");
            continue;
        };
        let mut contact: Contact = (*contact).clone();
        contact.inherit_from(&aor);
        scheduler.qualify_and_schedule(Arc::new(contact));
    }
}
