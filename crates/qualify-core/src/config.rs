//! Configuration system for the qualify daemon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $QUALIFY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/qualify/config.toml
//!   3. ~/.config/qualify/config.toml
//!
//! Location objects (endpoints, AORs, registered contacts) live in a separate
//! file named by `location.path`, see [`LocationConfig`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{Aor, Contact, Endpoint};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QualifyConfig {
    pub system: SystemConfig,
    pub sip: SipConfig,
    pub api: ApiConfig,
    pub location: LocationSource,
    /// Dialplan context → extensions that exist in it.
    pub dialplan: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Cap in seconds on the random initial delay of bulk-scheduled probes.
    /// 0 = cap at the contact's qualify_frequency.
    pub max_initial_qualify_time: u32,
    /// Max concurrently running probe tasks. 0 = available parallelism.
    pub worker_limit: u32,
    /// Separator after which a request-URI user carries per-user options.
    pub user_option_separator: char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    /// UDP address the SIP adapter binds to.
    pub bind: String,
    pub user_agent: String,
    /// Advertised Accept capability. Empty = not advertised.
    pub accept: String,
    /// Advertised Allow capability, OPTIONS is appended at start.
    pub allow: String,
    /// Advertised Supported capability. Empty = not advertised.
    pub supported: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Management API port on 127.0.0.1.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationSource {
    pub path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_initial_qualify_time: 0,
            worker_limit: 0,
            user_option_separator: ';',
        }
    }
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5060".to_string(),
            user_agent: concat!("qualifyd/", env!("CARGO_PKG_VERSION")).to_string(),
            accept: "application/sdp".to_string(),
            allow: "INVITE, ACK, CANCEL, BYE".to_string(),
            supported: "replaces, timer".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 9088 }
    }
}

impl Default for LocationSource {
    fn default() -> Self {
        Self {
            path: config_dir().join("location.toml"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("qualify")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl QualifyConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            QualifyConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("QUALIFY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&QualifyConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply QUALIFY_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("QUALIFY_SYSTEM__MAX_INITIAL_QUALIFY_TIME") {
            if let Ok(secs) = v.parse() {
                self.system.max_initial_qualify_time = secs;
            }
        }
        if let Ok(v) = std::env::var("QUALIFY_SIP__BIND") {
            self.sip.bind = v;
        }
        if let Ok(v) = std::env::var("QUALIFY_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Ok(v) = std::env::var("QUALIFY_LOCATION__PATH") {
            self.location.path = PathBuf::from(v);
        }
    }
}

/// Statically provisioned location objects.
///
/// ```toml
/// [[endpoint]]
/// id = "alice"
/// aors = "alice"
/// context = "default"
///
/// [[aor]]
/// id = "alice"
/// qualify_frequency = 60
/// contacts = ["sip:alice@192.0.2.10:5060"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    #[serde(rename = "endpoint")]
    pub endpoints: Vec<Endpoint>,
    #[serde(rename = "aor")]
    pub aors: Vec<Aor>,
    /// Registered (dynamic) contacts restored at start.
    #[serde(rename = "contact")]
    pub contacts: Vec<Contact>,
}

impl LocationConfig {
    /// Read the location file. A missing file yields an empty location.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }
}
