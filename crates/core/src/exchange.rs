//! Exchange: one recorded turn of conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque key-value payload supplied alongside an input.
pub type ContextMap = serde_json::Map<String, serde_json::Value>;

/// Identifies one exchange in a context store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeHandle(pub String);

impl ExchangeHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ExchangeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExchangeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user input plus its eventually assigned response.
///
/// `input`, `timestamp` and `context` never change after append; `response`
/// is set at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(default)]
    pub id: ExchangeHandle,

    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "user_input", alias = "input")]
    pub input: String,

    #[serde(default)]
    pub context: ContextMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl Exchange {
    pub fn new(input: impl Into<String>, context: ContextMap, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: ExchangeHandle::new(),
            timestamp,
            input: input.into(),
            context,
            response: None,
        }
    }

    pub fn handle(&self) -> ExchangeHandle {
        self.id.clone()
    }

    /// Whether both input and response are present.
    pub fn is_complete(&self) -> bool {
        self.response.is_some()
    }
}

/// Timestamps are written as RFC 3339. Older state files carry naive
/// ISO-8601 local times with no offset; those are read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
