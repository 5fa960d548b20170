//! Persisted per-contact health record.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::aor_from_id;

/// Reachability of a contact. Ordinals are persisted and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum StatusType {
    Unavailable = 0,
    Available = 1,
    Unknown = 2,
    Created = 3,
    Removed = 4,
}

impl StatusType {
    pub const ALL: [StatusType; 5] = [
        StatusType::Unavailable,
        StatusType::Available,
        StatusType::Unknown,
        StatusType::Created,
        StatusType::Removed,
    ];

    /// Label used in events, gauges and management output.
    pub fn label(self) -> &'static str {
        match self {
            StatusType::Unavailable => "Unreachable",
            StatusType::Available => "Reachable",
            StatusType::Unknown => "Unknown",
            StatusType::Created => "Created",
            StatusType::Removed => "Removed",
        }
    }

    /// Compact label for column output.
    pub fn short_label(self) -> &'static str {
        match self {
            StatusType::Unavailable => "Unavail",
            StatusType::Available => "Avail",
            StatusType::Unknown => "Unknown",
            StatusType::Created => "Created",
            StatusType::Removed => "Removed",
        }
    }
}

impl From<StatusType> for u32 {
    fn from(status: StatusType) -> Self {
        status as u32
    }
}

impl TryFrom<u32> for StatusType {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        StatusType::ALL
            .into_iter()
            .find(|s| *s as u32 == value)
            .ok_or_else(|| format!("invalid contact status ordinal {value}"))
    }
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Wall-clock start of the outstanding probe, as time since the epoch.
/// Zero means no probe is outstanding.
///
/// Persisted as `<seconds>.<microseconds>` with six fractional digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct RttStart(Duration);

impl RttStart {
    pub const ZERO: RttStart = RttStart(Duration::ZERO);

    pub fn now() -> Self {
        Self(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO),
        )
    }

    pub fn from_parts(secs: u64, micros: u32) -> Self {
        Self(Duration::new(secs, micros.saturating_mul(1_000)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.as_secs() == 0
    }

    pub fn secs(&self) -> u64 {
        self.0.as_secs()
    }

    pub fn subsec_micros(&self) -> u32 {
        self.0.subsec_micros()
    }

    /// Microseconds from this start until now. 0 when unset or in the future.
    pub fn elapsed_micros(&self) -> u64 {
        if self.is_zero() {
            return 0;
        }
        Self::now()
            .0
            .checked_sub(self.0)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

impl fmt::Display for RttStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs(), self.subsec_micros())
    }
}

impl FromStr for RttStart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (secs, micros) = s
            .split_once('.')
            .ok_or_else(|| format!("rtt_start '{s}' is not <sec>.<usec>"))?;
        let secs: u64 = secs
            .parse()
            .map_err(|_| format!("rtt_start seconds '{secs}' is not a number"))?;
        let micros: u32 = micros
            .parse()
            .map_err(|_| format!("rtt_start microseconds '{micros}' is not a number"))?;
        if micros >= 1_000_000 {
            return Err(format!("rtt_start microseconds {micros} out of range"));
        }
        Ok(Self::from_parts(secs, micros))
    }
}

impl Serialize for RttStart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RttStart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Health record for one contact, keyed by the contact id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactStatus {
    pub id: String,
    pub aor: String,
    pub uri: String,
    #[serde(default = "default_status")]
    pub status: StatusType,
    #[serde(default = "default_last_status")]
    pub last_status: StatusType,
    /// Last round trip in microseconds. 0 when not available.
    #[serde(default)]
    pub rtt: u64,
    #[serde(default)]
    pub rtt_start: RttStart,
    /// Set on re-notify updates that carry no state change. Never persisted.
    #[serde(skip)]
    pub refresh: bool,
}

fn default_status() -> StatusType {
    StatusType::Created
}

fn default_last_status() -> StatusType {
    StatusType::Unknown
}

impl ContactStatus {
    /// Allocate a fresh record for `id`. The AOR is derived from the id and
    /// `None` is returned when the id carries no AOR separator.
    pub fn new(id: &str) -> Option<Self> {
        let aor = aor_from_id(id)?;
        Some(Self {
            id: id.to_string(),
            aor: aor.to_string(),
            uri: String::new(),
            status: StatusType::Created,
            last_status: StatusType::Unknown,
            rtt: 0,
            rtt_start: RttStart::ZERO,
            refresh: false,
        })
    }

    /// Whether a probe is outstanding.
    pub fn in_flight(&self) -> bool {
        !self.rtt_start.is_zero()
    }
}
