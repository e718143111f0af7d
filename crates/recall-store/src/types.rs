use chrono::{DateTime, Utc};
use recall_core::types::{BlobType, Blob, BufferStatus, EventData, ProfileAttributes};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub secret: Option<String>,
    pub status: String,
    pub profile_config: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub project_id: String,
    pub additional_fields: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// User row with aggregate counts, for the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct UserOverview {
    #[serde(flatten)]
    pub user: UserRecord,
    pub profile_count: i64,
    pub event_count: i64,
}

#[derive(Debug, Clone)]
pub struct BlobRecord {
    pub id: String,
    pub blob_type: BlobType,
    pub blob: Blob,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BufferEntry {
    pub id: String,
    pub blob_id: String,
    pub blob_type: BlobType,
    pub token_size: i64,
    pub status: BufferStatus,
    pub created_at: String,
}

/// A buffered blob joined with its payload, in arrival order.
#[derive(Debug, Clone)]
pub struct BufferedBlob {
    pub entry_id: String,
    pub blob_id: String,
    pub token_size: i64,
    pub blob: Blob,
    pub blob_created_at: DateTime<Utc>,
}

/// One profile slot. Serializable because the list view round-trips through
/// the coordination cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub attributes: ProfileAttributes,
    pub content: String,
    pub update_hits: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    pub data: EventData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial event update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub event_tip: Option<String>,
    pub event_tags: Option<Vec<recall_core::types::EventTag>>,
    pub profile_delta: Option<Vec<recall_core::types::ProfileDelta>>,
}

/// One append-only user status record.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub id: String,
    #[serde(rename = "type")]
    pub status_type: String,
    pub attributes: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Daily token usage for one project.
#[derive(Debug, Clone, Serialize)]
pub struct DailyUsage {
    pub date: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
}
