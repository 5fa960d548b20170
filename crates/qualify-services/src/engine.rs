//! Probe engine: send one probe, turn its outcome into a status transition.

use std::sync::Arc;
use std::time::Duration;

use qualify_core::{endpoint_has_aor, Contact, Endpoint, RttStart, StatusType};

use crate::events::{EventBus, ProbeResult};
use crate::metrics::StateGauges;
use crate::signalling::{ProbeCompletion, ProbeOutcome, SignallingClient, SignallingError};
use crate::status::StatusStore;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("no endpoint references contact '{0}'")]
    NoEndpoint(String),
    #[error("unable to build probe: {0}")]
    Build(SignallingError),
    #[error("unable to send probe: {0}")]
    Dispatch(SignallingError),
}

/// How the current status row is looked up before a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    FindOrCreate,
    /// Outcomes for rows deleted meanwhile are dropped.
    ExistingOnly,
}

pub struct ProbeEngine {
    store: Arc<dyn Store>,
    statuses: Arc<StatusStore>,
    signalling: Arc<dyn SignallingClient>,
    gauges: Arc<StateGauges>,
    events: Arc<EventBus>,
}

impl ProbeEngine {
    pub fn new(
        store: Arc<dyn Store>,
        statuses: Arc<StatusStore>,
        signalling: Arc<dyn SignallingClient>,
        gauges: Arc<StateGauges>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            statuses,
            signalling,
            gauges,
            events,
        }
    }

    /// Issue one probe. On `Ok` exactly one outcome will be applied later.
    pub fn probe(
        self: &Arc<Self>,
        hint: Option<&Endpoint>,
        contact: Arc<Contact>,
    ) -> Result<(), ProbeError> {
        let endpoint = match hint {
            Some(endpoint) => endpoint.clone(),
            None => match self.resolve_endpoint(&contact) {
                Some(endpoint) => endpoint,
                None => {
                    tracing::warn!(
                        contact = %contact.id,
                        uri = %contact.uri,
                        "unable to find an endpoint to qualify contact, deleting it"
                    );
                    self.remove_orphan(&contact);
                    return Err(ProbeError::NoEndpoint(contact.id.clone()));
                }
            },
        };

        let mut request = self
            .signalling
            .create_probe(&endpoint, &contact)
            .map_err(|e| {
                tracing::error!(contact = %contact.id, error = %e, "unable to create request to qualify contact");
                ProbeError::Build(e)
            })?;

        if !contact.outbound_proxy.is_empty() {
            self.signalling
                .apply_outbound_proxy(&mut request, &contact.outbound_proxy)
                .map_err(|e| {
                    tracing::error!(
                        contact = %contact.id,
                        proxy = %contact.outbound_proxy,
                        error = %e,
                        "unable to apply outbound proxy on qualify request"
                    );
                    ProbeError::Build(e)
                })?;
        }

        self.init_start_time(&contact);

        let timeout = Duration::from_millis((contact.qualify_timeout * 1000.0) as u64);
        let engine = Arc::clone(self);
        let completion = ProbeCompletion::new(contact.clone(), move |contact, outcome| {
            engine.on_outcome(&contact, outcome)
        });

        tracing::debug!(
            contact = %contact.id,
            endpoint = %endpoint.id,
            timeout_ms = timeout.as_millis() as u64,
            "sending qualify"
        );

        if let Err(e) = self.signalling.send_probe(request, timeout, completion) {
            tracing::error!(contact = %contact.id, error = %e, "unable to send request to qualify contact");
            self.transition(&contact, StatusType::Unavailable, false, Lookup::FindOrCreate);
            return Err(ProbeError::Dispatch(e));
        }
        Ok(())
    }

    /// Explicit `endpoint_name` first, then an exact match among endpoints
    /// whose `aors` contains the contact's AOR.
    pub fn resolve_endpoint(&self, contact: &Contact) -> Option<Endpoint> {
        if !contact.endpoint_name.is_empty() {
            if let Some(endpoint) = self.store.endpoint(&contact.endpoint_name) {
                return Some(endpoint);
            }
        }
        self.store
            .endpoints_with_aors_like(&contact.aor)
            .into_iter()
            .find(|endpoint| endpoint_has_aor(endpoint, &contact.aor))
    }

    /// Terminal outcome delivered through a [`ProbeCompletion`].
    pub fn on_outcome(&self, contact: &Arc<Contact>, outcome: ProbeOutcome) {
        let value = match outcome {
            ProbeOutcome::Response { code } => {
                tracing::debug!(contact = %contact.id, code, "qualify response");
                StatusType::Available
            }
            ProbeOutcome::Timeout | ProbeOutcome::TransportError => StatusType::Unavailable,
            ProbeOutcome::Other(what) => {
                tracing::error!(contact = %contact.id, event = %what, "unexpected qualify outcome");
                StatusType::Unavailable
            }
        };
        self.transition(contact, value, false, Lookup::ExistingOnly);
    }

    /// Contact updated: re-notify the current status without a transition.
    pub fn refresh(&self, contact: &Arc<Contact>) {
        self.transition(contact, StatusType::Available, true, Lookup::FindOrCreate);
    }

    /// Probing is off for this contact.
    pub fn mark_unknown(&self, contact: &Arc<Contact>) {
        self.transition(contact, StatusType::Unknown, false, Lookup::FindOrCreate);
    }

    fn init_start_time(&self, contact: &Arc<Contact>) {
        let Some(current) = self.statuses.find_or_create(contact) else {
            tracing::error!(contact = %contact.id, "unable to find contact status");
            return;
        };
        self.statuses.apply_update(&current, |s| {
            s.uri = contact.uri.clone();
            s.rtt_start = RttStart::now();
        });
    }

    fn transition(&self, contact: &Arc<Contact>, value: StatusType, refresh: bool, lookup: Lookup) {
        let current = match lookup {
            Lookup::FindOrCreate => self.statuses.find_or_create(contact),
            Lookup::ExistingOnly => self.statuses.find(&contact.id),
        };
        let Some(current) = current else {
            match lookup {
                Lookup::FindOrCreate => {
                    tracing::error!(contact = %contact.id, "unable to find contact status")
                }
                Lookup::ExistingOnly => {
                    tracing::debug!(contact = %contact.id, "contact status gone, dropping outcome")
                }
            }
            return;
        };

        let mut value = value;
        let mut refresh = refresh;
        if refresh && current.status == StatusType::Created {
            // A real transition is coming, don't re-send Created.
            if contact.qualify_frequency > 0 || current.in_flight() {
                return;
            }
            refresh = false;
            value = StatusType::Unknown;
        }

        let updated = self.statuses.apply_update(&current, |s| {
            s.uri = contact.uri.clone();
            if refresh {
                s.refresh = true;
                return;
            }
            s.last_status = current.status;
            s.status = value;
            s.rtt = if value == StatusType::Available && current.in_flight() {
                current.rtt_start.elapsed_micros().max(1)
            } else {
                0
            };
            s.rtt_start = RttStart::ZERO;
            s.refresh = false;
        });

        let Some(updated) = updated else {
            return;
        };
        if refresh {
            return;
        }

        self.gauges.transition(current.status, updated.status);
        self.events
            .publish(ProbeResult::new(updated.id.clone(), updated.status, updated.rtt));
        tracing::info!(
            contact = %updated.id,
            from = current.status.label(),
            status = updated.status.label(),
            rtt = updated.rtt,
            "contact status"
        );
    }

    /// Orphan contact: delete it, which removes its schedule and status
    /// through the contact observer. Contacts the store doesn't know are
    /// cleaned up directly.
    fn remove_orphan(&self, contact: &Contact) {
        if let Err(e) = self.store.delete_contact(&contact.id) {
            tracing::debug!(contact = %contact.id, error = %e, "orphan contact not in store");
            self.statuses.delete(contact);
        }
    }
}
