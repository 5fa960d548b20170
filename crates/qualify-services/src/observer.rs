//! Store observers that keep the qualify schedule in step with contact and
//! AOR changes, plus the bulk reconcile.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use qualify_core::{Aor, Contact};

use crate::engine::ProbeEngine;
use crate::scheduler::Scheduler;
use crate::status::StatusStore;
use crate::store::{Observer, Store};

/// Contact created → qualify and schedule; updated → refresh; deleted →
/// unschedule and drop the status row.
pub fn contact_observer(
    scheduler: Arc<Scheduler>,
    engine: Arc<ProbeEngine>,
    statuses: Arc<StatusStore>,
) -> Observer<Contact> {
    let on_created = scheduler.clone();
    let on_deleted = scheduler;
    Observer {
        created: Some(Arc::new(move |contact: &Contact| {
            on_created.qualify_and_schedule(Arc::new(contact.clone()));
        })),
        updated: Some(Arc::new(move |contact: &Contact| {
            engine.refresh(&Arc::new(contact.clone()));
        })),
        deleted: Some(Arc::new(move |contact: &Contact| {
            on_deleted.unschedule(&contact.id);
            statuses.delete(contact);
        })),
    }
}

/// AOR created/updated → push its parameters onto its contacts and
/// reschedule them with jitter; deleted → unschedule its contacts.
pub fn aor_observer(store: Arc<dyn Store>, scheduler: Arc<Scheduler>) -> Observer<Aor> {
    let modified_store = store.clone();
    let modified_scheduler = scheduler.clone();
    let modified: Arc<dyn Fn(&Aor) + Send + Sync> = Arc::new(move |aor: &Aor| {
        schedule_aor_contacts(modified_store.as_ref(), &modified_scheduler, aor);
    });
    Observer {
        created: Some(modified.clone()),
        updated: Some(modified),
        deleted: Some(Arc::new(move |aor: &Aor| {
            for contact in store.aor_contacts(aor) {
                scheduler.unschedule(&contact.id);
            }
        })),
    }
}

/// Jitter-schedule every contact of `aor` with the AOR's parameters.
/// Returns the contacts handled.
pub fn schedule_aor_contacts(store: &dyn Store, scheduler: &Scheduler, aor: &Aor) -> Vec<String> {
    store
        .aor_contacts(aor)
        .into_iter()
        .map(|mut contact| {
            contact.inherit_from(aor);
            let id = contact.id.clone();
            scheduler.qualify_and_schedule_with_jitter(Arc::new(contact));
            id
        })
        .collect()
}

/// Rebuild the whole schedule: drop every entry, schedule contacts of AORs
/// with a frequency, then contacts with their own frequency that no AOR
/// covered.
pub fn reconcile_all(store: &dyn Store, scheduler: &Scheduler) {
    scheduler.unschedule_all();

    let mut covered = HashSet::new();
    for aor in store.aors().into_iter().filter(|a| a.qualify_frequency > 0) {
        covered.extend(schedule_aor_contacts(store, scheduler, &aor));
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let direct: Vec<Contact> = store
        .contacts()
        .into_iter()
        .filter(|c| c.qualify_frequency > 0)
        .filter(|c| c.is_permanent() || c.expiration_time > now)
        .filter(|c| !covered.contains(&c.id))
        .collect();
    let direct_count = direct.len();
    for contact in direct {
        scheduler.qualify_and_schedule_with_jitter(Arc::new(contact));
    }

    tracing::info!(
        scheduled = scheduler.len(),
        via_aor = covered.len(),
        direct = direct_count,
        "qualify schedule reconciled"
    );
}
