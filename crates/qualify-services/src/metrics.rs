//! Contact state gauges.
//!
//! One `probe.states.<label>` gauge per status label, counting contacts
//! currently in that state.

use std::collections::BTreeMap;

use dashmap::DashMap;

use qualify_core::StatusType;

const PREFIX: &str = "probe.states.";

/// Named signed gauges, shared by reference.
#[derive(Default)]
pub struct StateGauges {
    gauges: DashMap<String, i64>,
}

impl StateGauges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauge_name(status: StatusType) -> String {
        format!("{PREFIX}{}", status.label())
    }

    pub fn add(&self, status: StatusType, delta: i64) {
        *self.gauges.entry(Self::gauge_name(status)).or_insert(0) += delta;
    }

    /// A contact entered `status`.
    pub fn created(&self, status: StatusType) {
        self.add(status, 1);
    }

    /// A contact moved from `from` to `to`.
    pub fn transition(&self, from: StatusType, to: StatusType) {
        if from == to {
            return;
        }
        self.add(from, -1);
        self.add(to, 1);
    }

    /// A contact's status row went away.
    pub fn removed(&self, status: StatusType) {
        self.add(status, -1);
    }

    pub fn get(&self, status: StatusType) -> i64 {
        self.gauges
            .get(&Self::gauge_name(status))
            .map(|g| *g.value())
            .unwrap_or(0)
    }

    /// Every gauge ever touched, by full name.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.gauges
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}
