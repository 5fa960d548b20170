//! In-memory object store with change notifications.
//!
//! Backs the daemon (loaded from the location file) and the tests. Every map
//! is a `DashMap`, so readers never block each other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use qualify_core::config::LocationConfig;
use qualify_core::{Aor, Contact, ContactStatus, Endpoint, EndpointState};

use crate::store::{Callback, Observer, ObserverId, Store, StoreError};

/// Observer lists per object type.
struct Observers<T> {
    entries: DashMap<ObserverId, Observer<T>>,
}

impl<T> Observers<T> {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Snapshot the callbacks so none is invoked under a map lock.
    fn collect(&self, pick: impl Fn(&Observer<T>) -> Option<Callback<T>>) -> Vec<Callback<T>> {
        self.entries.iter().filter_map(|e| pick(e.value())).collect()
    }

    fn created(&self, obj: &T) {
        for cb in self.collect(|o| o.created.clone()) {
            cb(obj);
        }
    }

    fn updated(&self, obj: &T) {
        for cb in self.collect(|o| o.updated.clone()) {
            cb(obj);
        }
    }

    fn deleted(&self, obj: &T) {
        for cb in self.collect(|o| o.deleted.clone()) {
            cb(obj);
        }
    }
}

/// Object store keeping everything in concurrent maps.
pub struct MemoryStore {
    endpoints: DashMap<String, Endpoint>,
    endpoint_states: DashMap<String, EndpointState>,
    aors: DashMap<String, Aor>,
    contacts: DashMap<String, Contact>,
    statuses: DashMap<String, ContactStatus>,
    contact_observers: Observers<Contact>,
    aor_observers: Observers<Aor>,
    status_observers: Observers<ContactStatus>,
    next_observer: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            endpoints: DashMap::new(),
            endpoint_states: DashMap::new(),
            aors: DashMap::new(),
            contacts: DashMap::new(),
            statuses: DashMap::new(),
            contact_observers: Observers::new(),
            aor_observers: Observers::new(),
            status_observers: Observers::new(),
            next_observer: AtomicU64::new(1),
        }
    }

    /// Build a shared store from a location file's contents. No observers are
    /// installed yet, so nothing is notified.
    pub fn from_location(location: &LocationConfig) -> Arc<Self> {
        let store = Arc::new(Self::new());
        for endpoint in &location.endpoints {
            store.upsert_endpoint(endpoint.clone());
        }
        for aor in &location.aors {
            store.upsert_aor(aor.clone());
        }
        for contact in &location.contacts {
            if let Err(e) = store.add_contact(contact.clone()) {
                tracing::warn!(contact = %contact.id, error = %e, "skipping location contact");
            }
        }
        store
    }

    fn next_id(&self) -> ObserverId {
        ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed))
    }

    pub fn upsert_endpoint(&self, endpoint: Endpoint) {
        self.endpoints.insert(endpoint.id.clone(), endpoint);
    }

    pub fn delete_endpoint(&self, id: &str) -> Option<Endpoint> {
        self.endpoint_states.remove(id);
        self.endpoints.remove(id).map(|(_, e)| e)
    }

    pub fn endpoint_state(&self, id: &str) -> EndpointState {
        self.endpoint_states
            .get(id)
            .map(|s| *s.value())
            .unwrap_or_default()
    }

    /// Create or replace an AOR, syncing its permanent contacts.
    ///
    /// Contact notifications for added/removed permanent contacts fire first,
    /// then the AOR created/updated notification.
    pub fn upsert_aor(&self, aor: Aor) {
        let existed = self.aors.insert(aor.id.clone(), aor.clone()).is_some();

        let wanted: Vec<Contact> = aor
            .permanent_contacts
            .iter()
            .map(|uri| Contact::permanent(&aor, uri))
            .collect();

        let stale: Vec<Contact> = self
            .contacts
            .iter()
            .filter(|e| {
                let c = e.value();
                c.aor == aor.id && c.is_permanent() && !wanted.iter().any(|w| w.id == c.id)
            })
            .map(|e| e.value().clone())
            .collect();
        for contact in stale {
            if self.contacts.remove(&contact.id).is_some() {
                self.contact_observers.deleted(&contact);
            }
        }

        for contact in wanted {
            let is_new = match self.contacts.get_mut(&contact.id) {
                Some(mut existing) => {
                    existing.inherit_from(&aor);
                    false
                }
                None => true,
            };
            if is_new {
                self.contacts.insert(contact.id.clone(), contact.clone());
                self.contact_observers.created(&contact);
            }
        }

        if existed {
            self.aor_observers.updated(&aor);
        } else {
            self.aor_observers.created(&aor);
        }
    }

    /// Remove an AOR. The AOR deleted notification fires while its contacts are
    /// still present, then its permanent contacts are removed.
    pub fn delete_aor(&self, id: &str) -> Result<(), StoreError> {
        let aor = self
            .aors
            .get(id)
            .map(|a| a.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: "aor",
                id: id.to_string(),
            })?;

        self.aor_observers.deleted(&aor);
        self.aors.remove(id);

        let permanent: Vec<String> = self
            .contacts
            .iter()
            .filter(|e| e.value().aor == id && e.value().is_permanent())
            .map(|e| e.key().clone())
            .collect();
        for contact_id in permanent {
            let _ = self.delete_contact(&contact_id);
        }
        Ok(())
    }

    /// Add or refresh a registered contact. An existing id is an update.
    pub fn add_contact(&self, contact: Contact) -> Result<(), StoreError> {
        if qualify_core::aor_from_id(&contact.id) != Some(contact.aor.as_str()) {
            return Err(StoreError::Invalid {
                kind: "contact",
                reason: format!("id '{}' does not start with aor '{}'", contact.id, contact.aor),
            });
        }
        let existed = self
            .contacts
            .insert(contact.id.clone(), contact.clone())
            .is_some();
        if existed {
            self.contact_observers.updated(&contact);
        } else {
            self.contact_observers.created(&contact);
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn endpoint(&self, id: &str) -> Option<Endpoint> {
        self.endpoints.get(id).map(|e| e.value().clone())
    }

    fn endpoints_with_aors_like(&self, pattern: &str) -> Vec<Endpoint> {
        self.endpoints
            .iter()
            .filter(|e| e.value().aors.contains(pattern))
            .map(|e| e.value().clone())
            .collect()
    }

    fn set_endpoint_state(&self, id: &str, state: EndpointState) -> Result<(), StoreError> {
        if !self.endpoints.contains_key(id) {
            return Err(StoreError::NotFound {
                kind: "endpoint",
                id: id.to_string(),
            });
        }
        self.endpoint_states.insert(id.to_string(), state);
        Ok(())
    }

    fn aor(&self, id: &str) -> Option<Aor> {
        self.aors.get(id).map(|a| a.value().clone())
    }

    fn aors(&self) -> Vec<Aor> {
        self.aors.iter().map(|a| a.value().clone()).collect()
    }

    fn aor_contacts(&self, aor: &Aor) -> Vec<Contact> {
        let now = now_secs();
        self.contacts
            .iter()
            .filter(|e| {
                let c = e.value();
                c.aor == aor.id && (c.is_permanent() || c.expiration_time > now)
            })
            .map(|e| e.value().clone())
            .collect()
    }

    fn contact(&self, id: &str) -> Option<Contact> {
        self.contacts.get(id).map(|c| c.value().clone())
    }

    fn contacts(&self) -> Vec<Contact> {
        self.contacts.iter().map(|c| c.value().clone()).collect()
    }

    fn delete_contact(&self, id: &str) -> Result<(), StoreError> {
        let (_, contact) = self.contacts.remove(id).ok_or_else(|| StoreError::NotFound {
            kind: "contact",
            id: id.to_string(),
        })?;
        self.contact_observers.deleted(&contact);
        Ok(())
    }

    fn status(&self, id: &str) -> Option<ContactStatus> {
        self.statuses.get(id).map(|s| s.value().clone())
    }

    fn statuses(&self) -> Vec<ContactStatus> {
        self.statuses.iter().map(|s| s.value().clone()).collect()
    }

    fn create_status(&self, status: ContactStatus) -> Result<(), StoreError> {
        match self.statuses.entry(status.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists {
                    kind: "contact_status",
                    id: status.id,
                })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(status.clone());
            }
        }
        self.status_observers.created(&status);
        Ok(())
    }

    fn update_status(&self, status: ContactStatus) -> Result<(), StoreError> {
        match self.statuses.get_mut(&status.id) {
            Some(mut row) => {
                // The refresh flag is transient: listeners see it, the row doesn't.
                let mut persisted = status.clone();
                persisted.refresh = false;
                *row = persisted;
            }
            None => {
                return Err(StoreError::NotFound {
                    kind: "contact_status",
                    id: status.id,
                })
            }
        }
        self.status_observers.updated(&status);
        Ok(())
    }

    fn delete_status(&self, id: &str) -> Result<(), StoreError> {
        let (_, status) = self.statuses.remove(id).ok_or_else(|| StoreError::NotFound {
            kind: "contact_status",
            id: id.to_string(),
        })?;
        self.status_observers.deleted(&status);
        Ok(())
    }

    fn observe_contacts(&self, observer: Observer<Contact>) -> ObserverId {
        let id = self.next_id();
        self.contact_observers.entries.insert(id, observer);
        id
    }

    fn observe_aors(&self, observer: Observer<Aor>) -> ObserverId {
        let id = self.next_id();
        self.aor_observers.entries.insert(id, observer);
        id
    }

    fn observe_statuses(&self, observer: Observer<ContactStatus>) -> ObserverId {
        let id = self.next_id();
        self.status_observers.entries.insert(id, observer);
        id
    }

    fn remove_observer(&self, id: ObserverId) {
        self.contact_observers.entries.remove(&id);
        self.aor_observers.entries.remove(&id);
        self.status_observers.entries.remove(&id);
    }
}
