use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub use protocol::LogId;

/// Canonical severity bucket shared by log levels and AI categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Attention,
    Error,
    Success,
}

/// Every raw level spelling the backend and its clients are known to emit.
static LEVEL_ALIASES: Lazy<HashMap<&'static str, Severity>> = Lazy::new(|| {
    HashMap::from([
        ("info", Severity::Normal),
        ("normal", Severity::Normal),
        ("warning", Severity::Attention),
        ("attention", Severity::Attention),
        ("atenção", Severity::Attention),
        ("error", Severity::Error),
        ("erro", Severity::Error),
        ("success", Severity::Success),
        ("sucesso", Severity::Success),
    ])
});

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Normal, Severity::Attention, Severity::Error, Severity::Success];

    /// Look up a raw level spelling. Matching ignores case and surrounding whitespace.
    pub fn from_alias(raw: &str) -> Option<Severity> {
        LEVEL_ALIASES.get(raw.trim().to_lowercase().as_str()).copied()
    }

    /// Fold a raw level into its bucket; unknown or missing levels are `Normal`.
    pub fn fold(raw: Option<&str>) -> Severity {
        raw.and_then(Self::from_alias).unwrap_or(Severity::Normal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Attention => "attention",
            Severity::Error => "error",
            Severity::Success => "success",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log event held in the feed window. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: LogId,
    pub system_id: String,
    pub level: Severity,
    /// Level exactly as the backend sent it.
    pub raw_level: String,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LogEvent {
    /// The message payload: `content.message` for objects, the content itself for bare strings.
    pub fn message(&self) -> Option<&serde_json::Value> {
        match &self.content {
            serde_json::Value::Object(map) => map.get("message").filter(|m| !m.is_null()),
            serde_json::Value::Null => None,
            other => Some(other),
        }
    }

    /// Message as display text. Structured messages render as compact JSON.
    pub fn message_text(&self) -> Option<String> {
        match self.message()? {
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn container(&self) -> Option<&str> {
        self.content.get("container").and_then(|c| c.as_str()).filter(|c| !c.is_empty())
    }
}

impl From<protocol::LogRecord> for LogEvent {
    fn from(record: protocol::LogRecord) -> Self {
        Self {
            id: record.id,
            system_id: record.system_id,
            level: Severity::fold(Some(&record.level)),
            raw_level: record.level,
            content: record.content,
            created_at: record.created_at,
        }
    }
}

/// Classification state of a single log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Idle,
    Analyzing,
    Completed,
    Error,
}

impl AnalysisStatus {
    pub fn parse(raw: &str) -> Option<AnalysisStatus> {
        match raw.trim().to_lowercase().as_str() {
            "idle" => Some(AnalysisStatus::Idle),
            "analyzing" => Some(AnalysisStatus::Analyzing),
            "completed" => Some(AnalysisStatus::Completed),
            "error" => Some(AnalysisStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Idle => "idle",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Error => "error",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status per log id. A missing key means `Idle`.
pub type StatusMap = HashMap<LogId, AnalysisStatus>;

/// Convert the backend's string-keyed map. Entries that don't parse are dropped.
pub fn status_map_from_wire(wire: protocol::StatusMapWire) -> StatusMap {
    wire.into_iter()
        .filter_map(|(key, value)| {
            let id = key.trim().parse::<LogId>().ok();
            let status = AnalysisStatus::parse(&value);
            if id.is_none() || status.is_none() {
                tracing::debug!(key = %key, value = %value, "ignoring unrecognized status entry");
            }
            Some((id?, status?))
        })
        .collect()
}

/// Outcome of a successful classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub category: Severity,
    /// Category label as returned by the classifier, if any.
    pub raw_category: Option<String>,
    pub explanation: Option<String>,
}

impl AnalysisResult {
    pub fn from_reply(raw_category: Option<String>, explanation: Option<String>) -> Self {
        Self {
            category: crate::presenter::category_of(raw_category.as_deref()),
            raw_category,
            explanation,
        }
    }
}
