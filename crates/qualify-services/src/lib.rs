//! Contact qualify core: scheduling OPTIONS probes, tracking contact status,
//! and answering inbound probes.

pub mod admin;
pub mod dialplan;
pub mod endpoint_state;
pub mod engine;
pub mod events;
pub mod memory_store;
pub mod metrics;
pub mod observer;
pub mod pool;
pub mod qualifier;
pub mod responder;
pub mod scheduler;
pub mod signalling;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;

pub use admin::{
    Admin, AuthClass, CliOutput, CliResult, ContactStatusDetail, ManagerAction, ManagerResponse,
    CLI_USAGE, PJSIP_QUALIFY,
};
pub use dialplan::{Dialplan, StaticDialplan};
pub use engine::{ProbeEngine, ProbeError};
pub use events::{EventBus, ProbeResult};
pub use memory_store::MemoryStore;
pub use metrics::StateGauges;
pub use pool::{PoolClosed, WorkerPool};
pub use qualifier::Qualifier;
pub use responder::{Disposition, Responder};
pub use scheduler::Scheduler;
pub use signalling::{
    Capabilities, InboundRequest, ProbeCompletion, ProbeOutcome, ProbeReply, ProbeRequest,
    ReplyRoute, SignallingClient, SignallingError, PROBE_METHOD,
};
pub use status::StatusStore;
pub use store::{Observer, ObserverId, Store, StoreError};
