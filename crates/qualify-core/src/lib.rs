//! qualify-core — shared data model, status codec and configuration.
//! All other qualify crates depend on this one.

pub mod config;
pub mod model;
pub mod status;

pub use model::{aor_from_id, endpoint_has_aor, Aor, Contact, Endpoint, EndpointState};
pub use status::{ContactStatus, RttStart, StatusType};
