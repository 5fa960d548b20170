//! Object store contract: typed access to location objects and contact
//! status records, plus change notifications.

use std::sync::Arc;

use qualify_core::{Aor, Contact, ContactStatus, Endpoint, EndpointState};

/// One observer callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A fixed record of optional change callbacks for one object type.
pub struct Observer<T> {
    pub created: Option<Callback<T>>,
    pub updated: Option<Callback<T>>,
    pub deleted: Option<Callback<T>>,
}

impl<T> Default for Observer<T> {
    fn default() -> Self {
        Self {
            created: None,
            updated: None,
            deleted: None,
        }
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            created: self.created.clone(),
            updated: self.updated.clone(),
            deleted: self.deleted.clone(),
        }
    }
}

/// Handle returned by the `observe_*` calls, used to remove the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

/// The object store the prober consumes.
///
/// Queries return owned snapshots. Observers are invoked after the change is
/// visible and outside any internal lock, so callbacks may call back into the
/// store.
pub trait Store: Send + Sync {
    fn endpoint(&self, id: &str) -> Option<Endpoint>;
    /// Endpoints whose `aors` field contains `pattern` as a substring, i.e. a
    /// `aors LIKE %pattern%` query. Callers must still exact-match the list.
    fn endpoints_with_aors_like(&self, pattern: &str) -> Vec<Endpoint>;
    fn set_endpoint_state(&self, id: &str, state: EndpointState) -> Result<(), StoreError>;

    fn aor(&self, id: &str) -> Option<Aor>;
    fn aors(&self) -> Vec<Aor>;
    /// Live contacts of an AOR, permanent ones included, expired ones not.
    fn aor_contacts(&self, aor: &Aor) -> Vec<Contact>;

    fn contact(&self, id: &str) -> Option<Contact>;
    fn contacts(&self) -> Vec<Contact>;
    fn delete_contact(&self, id: &str) -> Result<(), StoreError>;

    fn status(&self, id: &str) -> Option<ContactStatus>;
    fn statuses(&self) -> Vec<ContactStatus>;
    fn create_status(&self, status: ContactStatus) -> Result<(), StoreError>;
    fn update_status(&self, status: ContactStatus) -> Result<(), StoreError>;
    fn delete_status(&self, id: &str) -> Result<(), StoreError>;

    fn observe_contacts(&self, observer: Observer<Contact>) -> ObserverId;
    fn observe_aors(&self, observer: Observer<Aor>) -> ObserverId;
    fn observe_statuses(&self, observer: Observer<ContactStatus>) -> ObserverId;
    fn remove_observer(&self, id: ObserverId);
}
