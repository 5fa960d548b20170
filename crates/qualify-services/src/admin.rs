//! Operator entry points: CLI qualify, the PJSIPQualify management action,
//! AOR reconfiguration and the ContactStatusDetail listing.

use std::sync::Arc;

use serde::Serialize;

use qualify_core::{Contact, Endpoint, StatusType};

use crate::engine::ProbeEngine;
use crate::observer::schedule_aor_contacts;
use crate::pool::WorkerPool;
use crate::scheduler::Scheduler;
use crate::store::{Store, StoreError};

// ── CLI ───────────────────────────────────────────────────────────────────────

pub const CLI_COMMAND: &str = "pjsip qualify";
pub const CLI_SUMMARY: &str = "Send an OPTIONS request to a PJSIP endpoint";
pub const CLI_USAGE: [&str; 2] = [
    "Usage: pjsip qualify <endpoint>",
    "       Send a SIP OPTIONS request to all contacts on the endpoint.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CliResult {
    Success,
    ShowUsage,
    Failure,
}

/// What the CLI handler printed and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliOutput {
    pub result: CliResult,
    pub lines: Vec<String>,
}

impl CliOutput {
    fn new(result: CliResult, lines: Vec<String>) -> Self {
        Self { result, lines }
    }
}

// ── Management action ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthClass {
    System,
    Reporting,
}

/// Descriptor of a management action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerAction {
    pub name: &'static str,
    pub auth: &'static [AuthClass],
}

pub const PJSIP_QUALIFY: ManagerAction = ManagerAction {
    name: "PJSIPQualify",
    auth: &[AuthClass::System, AuthClass::Reporting],
};

/// Response to a management action: `{"response": "Success", "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "response", content = "message")]
pub enum ManagerResponse {
    Success(String),
    Error(String),
}

// ── ContactStatusDetail ───────────────────────────────────────────────────────

/// One contact of an endpoint as reported by the endpoint listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactStatusDetail {
    #[serde(rename = "AOR")]
    pub aor: String,
    #[serde(rename = "URI")]
    pub uri: String,
    #[serde(rename = "UserAgent")]
    pub user_agent: String,
    #[serde(rename = "RegExpire")]
    pub reg_expire: u64,
    #[serde(rename = "ViaAddress", skip_serializing_if = "Option::is_none")]
    pub via_address: Option<String>,
    #[serde(rename = "CallID", skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(rename = "Status")]
    pub status: &'static str,
    /// Microseconds, or `N/A` while the status is Unknown.
    #[serde(rename = "RoundtripUsec")]
    pub roundtrip_usec: String,
    #[serde(rename = "EndpointName")]
    pub endpoint_name: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "AuthenticateQualify")]
    pub authenticate_qualify: bool,
    #[serde(rename = "OutboundProxy")]
    pub outbound_proxy: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "QualifyFrequency")]
    pub qualify_frequency: u32,
    /// Seconds with three decimals.
    #[serde(rename = "QualifyTimeout")]
    pub qualify_timeout: String,
}

impl ContactStatusDetail {
    pub fn new(
        aor_id: &str,
        contact: &Contact,
        status: StatusType,
        rtt: u64,
        endpoint: Option<&Endpoint>,
    ) -> Self {
        let via_address = (!contact.via_addr.is_empty()).then(|| {
            if contact.via_port != 0 {
                format!("{}:{}", contact.via_addr, contact.via_port)
            } else {
                contact.via_addr.clone()
            }
        });
        Self {
            aor: aor_id.to_string(),
            uri: contact.uri.clone(),
            user_agent: contact.user_agent.clone(),
            reg_expire: contact.expiration_time,
            via_address,
            call_id: (!contact.call_id.is_empty()).then(|| contact.call_id.clone()),
            status: status.label(),
            roundtrip_usec: if status == StatusType::Unknown {
                "N/A".to_string()
            } else {
                rtt.to_string()
            },
            endpoint_name: endpoint
                .map(|e| e.id.clone())
                .unwrap_or_else(|| contact.endpoint_name.clone()),
            id: contact.id.clone(),
            authenticate_qualify: contact.authenticate_qualify,
            outbound_proxy: contact.outbound_proxy.clone(),
            path: contact.path.clone(),
            qualify_frequency: contact.qualify_frequency,
            qualify_timeout: format!("{:.3}", contact.qualify_timeout),
        }
    }

    /// Manager event text, CRLF line endings, terminated by a blank line.
    pub fn to_ami(&self) -> String {
        let mut fields: Vec<(&str, String)> = vec![
            ("AOR", self.aor.clone()),
            ("URI", self.uri.clone()),
            ("UserAgent", self.user_agent.clone()),
            ("RegExpire", self.reg_expire.to_string()),
        ];
        if let Some(via) = &self.via_address {
            fields.push(("ViaAddress", via.clone()));
        }
        if let Some(call_id) = &self.call_id {
            fields.push(("CallID", call_id.clone()));
        }
        fields.extend([
            ("Status", self.status.to_string()),
            ("RoundtripUsec", self.roundtrip_usec.clone()),
            ("EndpointName", self.endpoint_name.clone()),
            ("ID", self.id.clone()),
            ("AuthenticateQualify", u8::from(self.authenticate_qualify).to_string()),
            ("OutboundProxy", self.outbound_proxy.clone()),
            ("Path", self.path.clone()),
            ("QualifyFrequency", self.qualify_frequency.to_string()),
            ("QualifyTimeout", self.qualify_timeout.clone()),
        ]);

        let mut out = String::from("Event: ContactStatusDetail\r\n");
        for (key, value) in fields {
            out.push_str(&format!("{key}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

pub struct Admin {
    store: Arc<dyn Store>,
    engine: Arc<ProbeEngine>,
    scheduler: Arc<Scheduler>,
    pool: Arc<WorkerPool>,
}

impl Admin {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<ProbeEngine>,
        scheduler: Arc<Scheduler>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            store,
            engine,
            scheduler,
            pool,
        }
    }

    /// `pjsip qualify <endpoint>`. `args` are the words after the command.
    /// Probes are one-shot and go out through the worker pool.
    pub fn cli_qualify(&self, args: &[String]) -> CliOutput {
        let [endpoint_name] = args else {
            return CliOutput::new(
                CliResult::ShowUsage,
                CLI_USAGE.iter().map(|l| l.to_string()).collect(),
            );
        };

        let Some(endpoint) = self.store.endpoint(endpoint_name) else {
            return CliOutput::new(
                CliResult::Failure,
                vec![format!("Unable to retrieve endpoint {endpoint_name}")],
            );
        };
        if self.pool.is_closed() {
            return CliOutput::new(CliResult::Failure, Vec::new());
        }

        let mut lines = Vec::new();
        if endpoint.aor_ids().next().is_none() {
            lines.push(format!("Endpoint {} has no AoR's configured", endpoint.id));
            return CliOutput::new(CliResult::Success, lines);
        }

        for aor_id in endpoint.aor_ids() {
            let Some(aor) = self.store.aor(aor_id) else {
                continue;
            };
            lines.push(format!("Sending qualify to endpoint {}", endpoint.id));
            for contact in self.store.aor_contacts(&aor) {
                lines.push(format!(" contact {}", contact.uri));
                self.enqueue(Some(endpoint.clone()), contact);
            }
        }
        tracing::info!(endpoint = %endpoint.id, "qualify requested from cli");
        CliOutput::new(CliResult::Success, lines)
    }

    /// `PJSIPQualify` with header `Endpoint`. Acknowledges after enqueueing,
    /// without waiting for any outcome.
    pub fn ami_qualify(&self, endpoint_name: Option<&str>) -> ManagerResponse {
        let Some(endpoint_name) = endpoint_name.filter(|n| !n.is_empty()) else {
            return ManagerResponse::Error("Endpoint parameter missing.".to_string());
        };
        let Some(endpoint) = self.store.endpoint(endpoint_name) else {
            return ManagerResponse::Error("Unable to retrieve endpoint".to_string());
        };
        if endpoint.aor_ids().next().is_none() {
            return ManagerResponse::Error("No AoRs configured for endpoint".to_string());
        }

        for aor_id in endpoint.aor_ids() {
            let Some(aor) = self.store.aor(aor_id) else {
                continue;
            };
            for contact in self.store.aor_contacts(&aor) {
                self.enqueue(None, contact);
            }
        }
        tracing::info!(endpoint = %endpoint.id, action = PJSIP_QUALIFY.name, "qualify requested");
        ManagerResponse::Success("Endpoint found, will qualify".to_string())
    }

    /// Drop the AOR's schedule and rebuild it with the AOR's current
    /// parameters. Returns the contacts rescheduled.
    pub fn reconfigure_aor(&self, aor_id: &str) -> Result<Vec<String>, StoreError> {
        let aor = self.store.aor(aor_id).ok_or_else(|| StoreError::NotFound {
            kind: "aor",
            id: aor_id.to_string(),
        })?;
        let removed = self.scheduler.unschedule_aor(&aor.id);
        let contacts = schedule_aor_contacts(self.store.as_ref(), &self.scheduler, &aor);
        tracing::info!(aor = %aor.id, removed, contacts = contacts.len(), "aor qualify reconfigured");
        Ok(contacts)
    }

    /// ContactStatusDetail for every contact of every AOR of the endpoint.
    pub fn contact_status_details(&self, endpoint_name: &str) -> Option<Vec<ContactStatusDetail>> {
        let endpoint = self.store.endpoint(endpoint_name)?;
        let mut details = Vec::new();
        for aor_id in endpoint.aor_ids() {
            let Some(aor) = self.store.aor(aor_id) else {
                continue;
            };
            for contact in self.store.aor_contacts(&aor) {
                let (status, rtt) = self
                    .store
                    .status(&contact.id)
                    .map(|s| (s.status, s.rtt))
                    .unwrap_or((StatusType::Unknown, 0));
                details.push(ContactStatusDetail::new(
                    &aor.id,
                    &contact,
                    status,
                    rtt,
                    Some(&endpoint),
                ));
            }
        }
        Some(details)
    }

    fn enqueue(&self, hint: Option<Endpoint>, contact: Contact) {
        let engine = self.engine.clone();
        let contact = Arc::new(contact);
        let id = contact.id.clone();
        let queued = self.pool.enqueue(move || {
            if let Err(e) = engine.probe(hint.as_ref(), contact) {
                tracing::debug!(error = %e, "on-demand qualify not sent");
            }
        });
        if queued.is_err() {
            tracing::warn!(contact = %id, "worker pool closed, on-demand qualify dropped");
        }
    }
}
