//! Item model shared with the host

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Namespace under `content.appData` that holds host-owned item flags
pub const APP_DATA_DOMAIN: &str = "org.standardnotes.sn";

/// A host-side record (note, tag, theme, ...) as seen by the component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Identity used for correlation and batch merging
    pub uuid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default)]
    pub content: Value,

    /// Version marker used to reject stale pushes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Host fields this core does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    pub fn new(uuid: impl Into<String>, content_type: impl Into<String>, content: Value) -> Self {
        Self {
            uuid: uuid.into(),
            content_type: Some(content_type.into()),
            content,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// The `content.text` field, if present
    pub fn text(&self) -> Option<&str> {
        self.content.get("text").and_then(Value::as_str)
    }

    /// Whether the host flagged this push as metadata-only
    pub fn is_metadata_update(&self) -> bool {
        self.extra
            .get("isMetadataUpdate")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// A host flag from `content.appData`, e.g. `pinned` or `locked`
    pub fn app_data_value(&self, key: &str) -> Option<&Value> {
        self.content.get("appData")?.get(APP_DATA_DOMAIN)?.get(key)
    }

    /// JSON form sent to the host
    ///
    /// Parent and child references are nulled so the host never receives an
    /// object graph.
    pub fn to_wire(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("children".to_string(), Value::Null);
            map.insert("parent".to_string(), Value::Null);
        }
        value
    }
}
