// ── Push envelope ──
//
// What the push provider hands us: an opaque id, a string-encoded send
// timestamp and an ordered list of string pairs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    #[serde(default)]
    pub persistent_id: String,
    #[serde(default)]
    pub sent: String,
    #[serde(default)]
    pub app_data: Vec<AppDataEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDataEntry {
    pub key: String,
    pub value: String,
}

impl AppDataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl PushEnvelope {
    pub fn new(persistent_id: impl Into<String>, sent: impl Into<String>) -> Self {
        Self {
            persistent_id: persistent_id.into(),
            sent: sent.into(),
            app_data: Vec::new(),
        }
    }

    /// Builder-style append of one appData pair.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.app_data.push(AppDataEntry::new(key, value));
        self
    }

    /// First appData value stored under `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.app_data
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// `sent` as an integer, `None` when it does not parse.
    pub fn sent_timestamp(&self) -> Option<i64> {
        self.sent.trim().parse().ok()
    }
}
