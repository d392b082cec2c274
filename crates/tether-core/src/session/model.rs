//! Session domain model.
//!
//! A session has two kinds of fields:
//! - persisted fields, projected into a [`SessionRecord`] and written to the store
//! - process-local fields (`pending_requests`), owned by the running actor only

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Severity vocabulary a client may select for server log notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Notice,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::Alert,
        LogLevel::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Alert => "alert",
            LogLevel::Emergency => "emergency",
        }
    }

    /// Resolves a possibly missing or malformed stored level.
    ///
    /// Missing, empty and unknown values all resolve to [`LogLevel::Info`].
    pub fn resolve(raw: Option<&str>) -> LogLevel {
        match raw.map(str::trim) {
            None | Some("") => LogLevel::default(),
            Some(value) => value.parse().unwrap_or_else(|_| {
                tracing::debug!(log_level = value, "Unknown log level in record, using default");
                LogLevel::default()
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            "alert" => Ok(LogLevel::Alert),
            "emergency" => Ok(LogLevel::Emergency),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// The persisted projection of a session.
///
/// This is the shape written by `save` and returned (after normalization)
/// by `load`. `log_level` stays optional here because records produced by
/// other nodes may omit it or send null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Store key, immutable once assigned
    pub id: String,
    /// Negotiated protocol version, `None` before the handshake
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Whether the handshake has completed
    #[serde(default)]
    pub initialized: bool,
    /// Free-form description of the connecting client
    #[serde(default)]
    pub client_info: Map<String, Value>,
    /// Capability flags declared by the client
    #[serde(default)]
    pub client_capabilities: Map<String, Value>,
    /// Selected log severity, see [`LogLevel`]
    #[serde(default)]
    pub log_level: Option<String>,
}

impl SessionRecord {
    /// Creates an empty, uninitialized record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protocol_version: None,
            initialized: false,
            client_info: Map::new(),
            client_capabilities: Map::new(),
            log_level: None,
        }
    }
}

/// A partial record for `update`. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_capabilities: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    pub fn initialized(mut self, initialized: bool) -> Self {
        self.initialized = Some(initialized);
        self
    }

    pub fn client_info(mut self, info: Map<String, Value>) -> Self {
        self.client_info = Some(info);
        self
    }

    pub fn client_capabilities(mut self, capabilities: Map<String, Value>) -> Self {
        self.client_capabilities = Some(capabilities);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level.as_str().to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merges the set fields into `record`, leaving every other field intact.
    pub fn apply_to(&self, record: &mut SessionRecord) {
        if let Some(version) = &self.protocol_version {
            record.protocol_version = Some(version.clone());
        }
        if let Some(initialized) = self.initialized {
            record.initialized = initialized;
        }
        if let Some(info) = &self.client_info {
            record.client_info = info.clone();
        }
        if let Some(capabilities) = &self.client_capabilities {
            record.client_capabilities = capabilities.clone();
        }
        if let Some(level) = &self.log_level {
            record.log_level = Some(level.clone());
        }
    }

    /// Builds a record from the patch alone, for updates on an absent key.
    pub fn into_record(self, id: impl Into<String>) -> SessionRecord {
        let mut record = SessionRecord::new(id);
        self.apply_to(&mut record);
        record
    }
}

/// The full in-memory state of a live session.
///
/// Returned by value as a snapshot; the running actor owns the only mutable copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub id: String,
    pub protocol_version: Option<String>,
    pub initialized: bool,
    pub client_info: Map<String, Value>,
    pub client_capabilities: Map<String, Value>,
    pub log_level: LogLevel,
    /// In-flight request id -> method. Never persisted.
    pub pending_requests: HashMap<String, String>,
}

impl SessionState {
    /// Fresh state for a session with no stored record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protocol_version: None,
            initialized: false,
            client_info: Map::new(),
            client_capabilities: Map::new(),
            log_level: LogLevel::default(),
            pending_requests: HashMap::new(),
        }
    }

    /// Builds live state from a normalized record. `pending_requests` starts empty.
    pub fn from_record(record: SessionRecord) -> Self {
        let log_level = LogLevel::resolve(record.log_level.as_deref());
        Self {
            id: record.id,
            protocol_version: record.protocol_version.filter(|v| !v.is_empty()),
            initialized: record.initialized,
            client_info: record.client_info,
            client_capabilities: record.client_capabilities,
            log_level,
            pending_requests: HashMap::new(),
        }
    }

    /// Persisted projection of this state.
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id.clone(),
            protocol_version: self.protocol_version.clone(),
            initialized: self.initialized,
            client_info: self.client_info.clone(),
            client_capabilities: self.client_capabilities.clone(),
            log_level: Some(self.log_level.as_str().to_string()),
        }
    }

    /// Takes every persisted field from `remote` and keeps local-only fields.
    ///
    /// The id is kept from `self`: the remote record was looked up by it.
    pub fn merge_remote(&self, remote: SessionRecord) -> SessionState {
        let mut merged = SessionState::from_record(remote);
        merged.id = self.id.clone();
        merged.pending_requests = self.pending_requests.clone();
        merged
    }
}
