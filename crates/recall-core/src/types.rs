use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of ingested artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobType {
    Chat,
    Doc,
}

impl std::fmt::Display for BlobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Doc => write!(f, "doc"),
        }
    }
}

impl std::str::FromStr for BlobType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "doc" => Ok(Self::Doc),
            other => Err(format!("unknown blob type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of a chat blob. `created_at` is an opaque caller-supplied display
/// timestamp; when absent the blob's own timestamp is used for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChatMessage {
    /// Speaker label: `alias(role)` when an alias was supplied, else the role.
    pub fn speaker(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}({})", alias, self.role),
            None => self.role.to_string(),
        }
    }
}

/// One ingested artifact. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Blob {
    Chat { messages: Vec<ChatMessage> },
    Doc { content: String },
}

impl Blob {
    pub fn blob_type(&self) -> BlobType {
        match self {
            Blob::Chat { .. } => BlobType::Chat,
            Blob::Doc { .. } => BlobType::Doc,
        }
    }

    /// Plain-text rendering used for token accounting and prompt input.
    /// Chat turns come out as `[TIME] NAME: CONTENT` lines.
    pub fn render(&self, blob_created_at: &DateTime<Utc>) -> String {
        match self {
            Blob::Chat { messages } => {
                let fallback = format_display_time(blob_created_at);
                messages
                    .iter()
                    .map(|m| {
                        let ts = m.created_at.as_deref().unwrap_or(&fallback);
                        format!("[{}] {}: {}", ts, m.speaker(), m.content)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Blob::Doc { content } => content.clone(),
        }
    }
}

pub fn format_display_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y/%m/%d %I:%M%p").to_string()
}

/// Buffer entry lifecycle. Legal moves: idle -> processing -> {done, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferStatus {
    Idle,
    Processing,
    Done,
    Failed,
}

impl BufferStatus {
    pub fn can_transition_to(self, next: BufferStatus) -> bool {
        matches!(
            (self, next),
            (BufferStatus::Idle, BufferStatus::Processing)
                | (BufferStatus::Processing, BufferStatus::Done)
                | (BufferStatus::Processing, BufferStatus::Failed)
                | (BufferStatus::Failed, BufferStatus::Processing)
        )
    }
}

impl std::fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Processing => write!(f, "processing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for BufferStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown buffer status: {other}")),
        }
    }
}

/// Normalize a topic or sub-topic attribute: lowercase, trimmed, inner
/// whitespace replaced with `_`. All attribute comparisons happen on the
/// normalized form.
pub fn normalize_attribute(attr: &str) -> String {
    attr.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// The (topic, sub_topic) pair of a profile slot, always stored normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileAttributes {
    pub topic: String,
    pub sub_topic: String,
}

impl ProfileAttributes {
    pub fn new(topic: &str, sub_topic: &str) -> Self {
        Self {
            topic: normalize_attribute(topic),
            sub_topic: normalize_attribute(sub_topic),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.topic.is_empty() && !self.sub_topic.is_empty()
    }
}

impl std::fmt::Display for ProfileAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.topic, self.sub_topic)
    }
}

/// One add/update a flush applied, as recorded on the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDelta {
    pub content: String,
    pub attributes: ProfileAttributes,
}

/// A `{tag, value}` pair restricted to the project's declared tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTag {
    pub tag: String,
    pub value: String,
}

/// Payload of one event-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_tip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_tags: Option<Vec<EventTag>>,
    #[serde(default)]
    pub profile_delta: Vec<ProfileDelta>,
}

impl EventData {
    /// Text form used for token budgeting and embedding input.
    pub fn render(&self, created_at: &DateTime<Utc>) -> String {
        let mut out = format!("[{}]", created_at.format("%Y-%m-%d"));
        if let Some(tip) = &self.event_tip {
            out.push(' ');
            out.push_str(tip);
        }
        for d in &self.profile_delta {
            out.push_str(&format!("\n- {}: {}", d.attributes, d.content));
        }
        out
    }
}

/// Outcome of one committed flush.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlushResult {
    pub event_id: Option<String>,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl FlushResult {
    pub fn is_noop(&self) -> bool {
        self.event_id.is_none()
            && self.added.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
    }
}
