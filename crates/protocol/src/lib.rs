use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying the administrative credential.
pub const MASTER_KEY_HEADER: &str = "x-master-key";

/// Backend-assigned log identifier.
pub type LogId = i64;

/// Raw status map as served by `GET /logs/status`. Keys are log ids in string form.
pub type StatusMapWire = BTreeMap<String, String>;

/// A log event as returned by `GET /logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: LogId,
    pub system_id: String,
    /// Either an object (`message`, `container`, ...) or a bare string.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub level: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Reply of `POST /analyze/{log_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Failed {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Analysis {
        #[serde(default)]
        analysis: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
}

/// One row of `GET /stats/daily`: `{ "date": "2024-05-01", "<system>": count, ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatsRow {
    pub date: String,
    #[serde(flatten)]
    pub counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub client_name: Option<String>,
    pub client_email: String,
    #[serde(default)]
    pub client_phone: Option<String>,
    pub maintenance_email: String,
    pub status: String,
    #[serde(default)]
    pub technical_info: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub client_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_phone: Option<String>,
    pub maintenance_email: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_info: Option<String>,
}

/// Body of `PUT /systems/{id}`. Absent fields are left untouched by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_info: Option<String>,
}

impl SystemUpdate {
    pub fn technical_info<S: Into<String>>(text: S) -> Self {
        Self { technical_info: Some(text.into()), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRecord {
    pub id: i64,
    pub system_id: String,
    pub pattern: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /systems/{id}/filters` and `POST /systems/{id}/cleanup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternBody {
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub status: String,
    pub cleaned_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: i64,
    pub system_id: String,
    pub log_id: LogId,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// The backend emits both RFC 3339 and naive ISO timestamps; naive ones are UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }
}
