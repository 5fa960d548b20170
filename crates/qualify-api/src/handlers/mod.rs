//! HTTP API handlers exposing the qualify admin entry points as JSON.

pub mod contacts;
pub mod qualify;
pub mod service;

use std::sync::Arc;

use qualify_services::Qualifier;

#[derive(Clone)]
pub struct ApiState {
    pub qualifier: Arc<Qualifier>,
}

impl ApiState {
    pub fn new(qualifier: Arc<Qualifier>) -> Self {
        Self { qualifier }
    }
}

// Re-export handler functions for use in router setup.
pub use contacts::{handle_endpoint_contacts, handle_statuses};
pub use qualify::{handle_cli_qualify, handle_qualify};
pub use service::{handle_aor_reconfigure, handle_metrics, handle_reload};
