//! Location objects (contacts, AORs, endpoints) as handed to the prober
//! by the object store.

use serde::{Deserialize, Serialize};

/// Separator between AOR and tail in a dynamic (registered) contact id.
pub const DYNAMIC_SEPARATOR: &str = ";@";
/// Separator between AOR and tail in a static (permanent) contact id.
pub const STATIC_SEPARATOR: &str = "@@";

/// A concrete network address at which a peer may be reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    /// `<aor>;@<tail>` for dynamic contacts, `<aor>@@<tail>` for static ones.
    pub id: String,
    /// Owning AOR id. Always the id prefix up to the separator.
    pub aor: String,
    /// Signalling URI probes are sent to.
    pub uri: String,
    /// Explicit endpoint. Empty = resolve through the AOR.
    pub endpoint_name: String,
    /// Outbound proxy URI. Empty = none.
    pub outbound_proxy: String,
    /// Seconds between probes. 0 disables probing.
    pub qualify_frequency: u32,
    /// Seconds to wait for a probe response.
    pub qualify_timeout: f64,
    pub authenticate_qualify: bool,
    /// Epoch seconds. 0 = permanent.
    pub expiration_time: u64,

    // Reported in ContactStatusDetail only.
    pub user_agent: String,
    pub via_addr: String,
    pub via_port: u16,
    pub call_id: String,
    pub path: String,
}

impl Default for Contact {
    fn default() -> Self {
        Self {
            id: String::new(),
            aor: String::new(),
            uri: String::new(),
            endpoint_name: String::new(),
            outbound_proxy: String::new(),
            qualify_frequency: 0,
            qualify_timeout: 3.0,
            authenticate_qualify: false,
            expiration_time: 0,
            user_agent: String::new(),
            via_addr: String::new(),
            via_port: 0,
            call_id: String::new(),
            path: String::new(),
        }
    }
}

impl Contact {
    /// Build a permanent contact for an AOR. The id is `<aor>@@<uri>`.
    pub fn permanent(aor: &Aor, uri: &str) -> Self {
        let mut contact = Self {
            id: format!("{}{}{}", aor.id, STATIC_SEPARATOR, uri),
            aor: aor.id.clone(),
            uri: uri.to_string(),
            ..Self::default()
        };
        contact.inherit_from(aor);
        contact
    }

    /// Build a registered contact expiring at `expiration_time`.
    pub fn dynamic(aor: &str, uri: &str, expiration_time: u64) -> Self {
        Self {
            id: format!("{}{}{}", aor, DYNAMIC_SEPARATOR, uri),
            aor: aor.to_string(),
            uri: uri.to_string(),
            expiration_time,
            ..Self::default()
        }
    }

    /// Copy the group's probe parameters onto this contact.
    pub fn inherit_from(&mut self, aor: &Aor) {
        self.qualify_frequency = aor.qualify_frequency;
        self.qualify_timeout = aor.qualify_timeout;
        self.authenticate_qualify = aor.authenticate_qualify;
    }

    pub fn is_permanent(&self) -> bool {
        self.expiration_time == 0
    }
}

/// Address of record: groups contacts and carries default probe parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Aor {
    pub id: String,
    pub qualify_frequency: u32,
    pub qualify_timeout: f64,
    pub authenticate_qualify: bool,
    /// URIs of statically provisioned contacts.
    #[serde(rename = "contacts")]
    pub permanent_contacts: Vec<String>,
}

impl Default for Aor {
    fn default() -> Self {
        Self {
            id: String::new(),
            qualify_frequency: 0,
            qualify_timeout: 3.0,
            authenticate_qualify: false,
            permanent_contacts: Vec::new(),
        }
    }
}

impl Aor {
    pub fn has_permanent_contacts(&self) -> bool {
        !self.permanent_contacts.is_empty()
    }
}

/// A higher-level peer referencing one or more AORs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub id: String,
    /// Comma-separated AOR ids.
    pub aors: String,
    /// Dialplan context used when answering inbound probes.
    pub context: String,
}

impl Endpoint {
    /// Iterate the AOR ids, trimmed, skipping empty entries.
    pub fn aor_ids(&self) -> impl Iterator<Item = &str> {
        self.aors.split(',').map(str::trim).filter(|a| !a.is_empty())
    }
}

/// Device state surfaced for an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    #[default]
    Offline,
    Online,
}

/// AOR prefix of a contact id, or `None` when the id carries no separator.
pub fn aor_from_id(id: &str) -> Option<&str> {
    id.find(DYNAMIC_SEPARATOR)
        .or_else(|| id.find(STATIC_SEPARATOR))
        .map(|pos| &id[..pos])
}

/// Exact comma-split match of `aor` against an endpoint's `aors` field.
///
/// Second phase after a substring (`LIKE %aor%`) search, which alone would
/// match `aaabccc` when looking for `abc`.
pub fn endpoint_has_aor(endpoint: &Endpoint, aor: &str) -> bool {
    !aor.is_empty() && endpoint.aor_ids().any(|a| a == aor)
}
