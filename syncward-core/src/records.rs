//! Record shapes exchanged between the local store and the remote document
//! store. Field contents are opaque here; only identity matters to the
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A lexical entry as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub guid: Uuid,
    /// Storage id in the remote document store, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub fields: serde_json::Value,
    #[serde(default)]
    pub deleted: bool,
    pub modified_at: DateTime<Utc>,
}

impl Record {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            id: None,
            label: label.into(),
            fields: serde_json::Value::Null,
            deleted: false,
            modified_at: Utc::now(),
        }
    }
}

/// A reviewer comment attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_guid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub modified_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(entry_guid: Uuid, content: impl Into<String>) -> Self {
        Self {
            guid: Some(Uuid::new_v4()),
            id: None,
            entry_guid: Some(entry_guid),
            content: Some(content.into()),
            modified_at: Utc::now(),
        }
    }
}
