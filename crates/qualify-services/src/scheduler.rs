//! Periodic qualify scheduler.
//!
//! Timers run on a dedicated single-worker runtime (thread `qualify-sched`).
//! Each scheduled contact owns one timer task; the entry map holds at most
//! one entry per contact id. A fire only enqueues a probe on the worker pool
//! and re-arms at `qualify_frequency` seconds, whatever the probe's fate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;

use qualify_core::Contact;

use crate::engine::ProbeEngine;
use crate::pool::WorkerPool;
use crate::store::Store;

struct SchedEntry {
    /// Distinguishes a replaced entry from its successor.
    generation: u64,
    contact: Arc<Contact>,
    timer: AbortHandle,
}

pub struct Scheduler {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    entries: Arc<DashMap<String, SchedEntry>>,
    next_generation: AtomicU64,
    stopped: AtomicBool,
    store: Arc<dyn Store>,
    engine: Arc<ProbeEngine>,
    pool: Arc<WorkerPool>,
    /// Seconds, 0 = no cap beyond the contact's frequency.
    max_initial_qualify_time: u32,
}

/// Random initial delay in ms: `min(max_initial, frequency) * 1000 * U[0,1)`.
/// A zero `max_initial` caps at `frequency`.
pub fn jittered_delay_ms(max_initial_qualify_time: u32, qualify_frequency: u32) -> u64 {
    let cap = if max_initial_qualify_time > 0 && max_initial_qualify_time < qualify_frequency {
        max_initial_qualify_time
    } else {
        qualify_frequency
    };
    ((cap as f64 * 1000.0) * rand::random::<f64>()) as u64
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<ProbeEngine>,
        pool: Arc<WorkerPool>,
        max_initial_qualify_time: u32,
    ) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("qualify-sched")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();
        tracing::info!(max_initial_qualify_time, "qualify scheduler started");
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            entries: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
            store,
            engine,
            pool,
            max_initial_qualify_time,
        })
    }

    /// Arm a timer firing after `initial_delay_ms`, then every
    /// `qualify_frequency` seconds. Replaces any entry for the same contact.
    pub fn schedule(&self, contact: Arc<Contact>, initial_delay_ms: u64) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if contact.qualify_frequency == 0 {
            tracing::warn!(contact = %contact.id, "refusing to schedule contact with qualify_frequency 0");
            return;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let id = contact.id.clone();

        // The shard stays locked until the entry is in place, so a timer that
        // fires immediately and removes itself can't race the insert.
        let slot = self.entries.entry(id.clone());
        let timer = self
            .handle
            .spawn(fire_loop(
                generation,
                contact.clone(),
                initial_delay_ms,
                self.entries.clone(),
                self.store.clone(),
                self.engine.clone(),
                self.pool.clone(),
            ))
            .abort_handle();
        let entry = SchedEntry {
            generation,
            contact,
            timer,
        };
        match slot {
            Entry::Occupied(mut old) => {
                old.get().timer.abort();
                old.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }

        tracing::debug!(contact = %id, initial_delay_ms, "qualify scheduled");
    }

    /// Drop the entry for `contact_id`, if any.
    pub fn unschedule(&self, contact_id: &str) {
        if let Some((_, entry)) = self.entries.remove(contact_id) {
            entry.timer.abort();
            tracing::debug!(contact = %contact_id, "qualify unscheduled");
        }
    }

    /// Drop every entry belonging to `aor_id`. Returns how many went.
    pub fn unschedule_aor(&self, aor_id: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            if entry.contact.aor == aor_id {
                entry.timer.abort();
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn unschedule_all(&self) {
        self.entries.retain(|_, entry| {
            entry.timer.abort();
            false
        });
    }

    /// Probe now and again every `qualify_frequency` seconds, or mark the
    /// contact `Unknown` when probing is off.
    pub fn qualify_and_schedule(&self, contact: Arc<Contact>) {
        self.unschedule(&contact.id);
        if contact.qualify_frequency > 0 {
            // Arm first: a probe that finds the contact orphaned must see
            // the entry to remove it.
            let interval_ms = contact.qualify_frequency as u64 * 1000;
            self.schedule(contact.clone(), interval_ms);
            enqueue_probe(&self.pool, &self.engine, contact);
        } else {
            self.engine.mark_unknown(&contact);
        }
    }

    /// As [`qualify_and_schedule`](Self::qualify_and_schedule) but the first
    /// probe waits a random share of the frequency. Used for bulk loads.
    pub fn qualify_and_schedule_with_jitter(&self, contact: Arc<Contact>) {
        let initial = jittered_delay_ms(self.max_initial_qualify_time, contact.qualify_frequency);
        self.unschedule(&contact.id);
        if contact.qualify_frequency > 0 {
            self.schedule(contact, initial);
        } else {
            self.engine.mark_unknown(&contact);
        }
    }

    pub fn is_scheduled(&self, contact_id: &str) -> bool {
        self.entries.contains_key(contact_id)
    }

    /// Ids of all scheduled contacts, sorted.
    pub fn scheduled_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tear down the timer context, then release every entry. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
        let released = self.entries.len();
        self.entries.clear();
        tracing::info!(released, "qualify scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn fire_loop(
    generation: u64,
    contact: Arc<Contact>,
    initial_delay_ms: u64,
    entries: Arc<DashMap<String, SchedEntry>>,
    store: Arc<dyn Store>,
    engine: Arc<ProbeEngine>,
    pool: Arc<WorkerPool>,
) {
    let mut delay = Duration::from_millis(initial_delay_ms);
    loop {
        tokio::time::sleep(delay).await;

        // The AOR went away: stop qualifying this contact.
        if store.aor(&contact.aor).is_none() {
            entries.remove_if(&contact.id, |_, entry| entry.generation == generation);
            tracing::debug!(contact = %contact.id, aor = %contact.aor, "aor gone, qualify stopped");
            return;
        }

        enqueue_probe(&pool, &engine, contact.clone());
        delay = Duration::from_millis(contact.qualify_frequency as u64 * 1000);
    }
}

/// Hand one probe to the pool. A closed pool drops the task and its
/// contact reference.
pub(crate) fn enqueue_probe(pool: &WorkerPool, engine: &Arc<ProbeEngine>, contact: Arc<Contact>) {
    let engine = engine.clone();
    let id = contact.id.clone();
    let queued = pool.enqueue(move || {
        if let Err(e) = engine.probe(None, contact) {
            tracing::debug!(error = %e, "qualify not sent");
        }
    });
    if queued.is_err() {
        tracing::debug!(contact = %id, "worker pool closed, qualify dropped");
    }
}
