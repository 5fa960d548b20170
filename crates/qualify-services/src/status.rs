//! Contact status facade over the object store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use qualify_core::{Contact, ContactStatus, StatusType};

use crate::metrics::StateGauges;
use crate::store::{Store, StoreError};

/// Permanent contacts created after boot, waiting for their first qualify.
pub type InitialQualifyRx = mpsc::UnboundedReceiver<Arc<Contact>>;

pub struct StatusStore {
    store: Arc<dyn Store>,
    gauges: Arc<StateGauges>,
    /// Held only across retrieve + allocate + persist.
    create_lock: Mutex<()>,
    booted: Arc<AtomicBool>,
    initial_tx: mpsc::UnboundedSender<Arc<Contact>>,
}

impl StatusStore {
    pub fn new(
        store: Arc<dyn Store>,
        gauges: Arc<StateGauges>,
        booted: Arc<AtomicBool>,
    ) -> (Self, InitialQualifyRx) {
        let (initial_tx, initial_rx) = mpsc::unbounded_channel();
        let statuses = Self {
            store,
            gauges,
            create_lock: Mutex::new(()),
            booted,
            initial_tx,
        };
        (statuses, initial_rx)
    }

    pub fn find(&self, contact_id: &str) -> Option<ContactStatus> {
        self.store.status(contact_id)
    }

    /// Existing record for `contact`, or a freshly persisted `Created` one.
    /// `None` when the record could not be allocated or persisted.
    pub fn find_or_create(&self, contact: &Arc<Contact>) -> Option<ContactStatus> {
        let created = {
            let _guard = self
                .create_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if let Some(existing) = self.store.status(&contact.id) {
                return Some(existing);
            }

            let Some(mut status) = ContactStatus::new(&contact.id) else {
                tracing::error!(
                    contact = %contact.id,
                    aor = %contact.aor,
                    uri = %contact.uri,
                    "unable to create contact status, id has no aor separator"
                );
                return None;
            };
            status.uri = contact.uri.clone();

            if let Err(e) = self.store.create_status(status.clone()) {
                tracing::error!(contact = %contact.id, error = %e, "unable to persist contact status");
                return None;
            }
            status
        };

        self.gauges.created(StatusType::Created);

        // Contacts present at boot are picked up by the startup reconcile.
        if self.booted.load(Ordering::Acquire) && contact.is_permanent() {
            if self.initial_tx.send(contact.clone()).is_err() {
                tracing::debug!(contact = %contact.id, "initial qualify queue closed");
            }
        }

        Some(created)
    }

    /// Copy `current`, apply `mutate`, persist. Returns the persisted value,
    /// or `None` after logging when the row could not be updated.
    pub fn apply_update(
        &self,
        current: &ContactStatus,
        mutate: impl FnOnce(&mut ContactStatus),
    ) -> Option<ContactStatus> {
        let mut update = current.clone();
        mutate(&mut update);
        match self.store.update_status(update.clone()) {
            Ok(()) => Some(update),
            Err(e) => {
                tracing::error!(contact = %current.id, uri = %update.uri, error = %e, "unable to update contact status");
                None
            }
        }
    }

    /// Remove the status row of `contact`, if any.
    pub fn delete(&self, contact: &Contact) {
        let Some(existing) = self.store.status(&contact.id) else {
            return;
        };
        match self.store.delete_status(&contact.id) {
            Ok(()) => self.gauges.removed(existing.status),
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(contact = %contact.id, error = %e, "unable to delete contact status")
            }
        }
    }
}
