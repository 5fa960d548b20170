//! Marks endpoints ONLINE for peers that are never probed but are known to
//! be there: static contacts with qualify off, and live registrations with
//! qualify off.

use std::time::{SystemTime, UNIX_EPOCH};

use qualify_core::{endpoint_has_aor, EndpointState};

use crate::store::Store;

/// Returns the ids of endpoints marked online, in the order they were marked.
pub fn update_all_unqualified_endpoints(store: &dyn Store) -> Vec<String> {
    let mut marked = Vec::new();

    for aor in store
        .aors()
        .into_iter()
        .filter(|a| a.has_permanent_contacts() && a.qualify_frequency == 0)
    {
        if aor.id.is_empty() {
            continue;
        }
        // LIKE search, then the exact comma-split match.
        for endpoint in store
            .endpoints_with_aors_like(&aor.id)
            .into_iter()
            .filter(|e| endpoint_has_aor(e, &aor.id))
        {
            match store.set_endpoint_state(&endpoint.id, EndpointState::Online) {
                Ok(()) => marked.push(endpoint.id),
                Err(e) => tracing::warn!(
                    endpoint = %endpoint.id,
                    aor = %aor.id,
                    error = %e,
                    "unable to find persistent endpoint for aor"
                ),
            }
        }
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    for contact in store.contacts().into_iter().filter(|c| {
        !c.endpoint_name.is_empty() && c.qualify_frequency == 0 && c.expiration_time > now
    }) {
        match store.set_endpoint_state(&contact.endpoint_name, EndpointState::Online) {
            Ok(()) => marked.push(contact.endpoint_name),
            Err(e) => tracing::warn!(
                endpoint = %contact.endpoint_name,
                aor = %contact.aor,
                uri = %contact.uri,
                error = %e,
                "unable to find persistent endpoint for contact"
            ),
        }
    }

    tracing::debug!(count = marked.len(), "unqualified endpoints marked online");
    marked
}
