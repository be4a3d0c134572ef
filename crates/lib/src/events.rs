//! Inbound conversation events: wire envelope, typed variants, and parsing.
//!
//! The provider posts `{ "type", "timestamp", "data" }`. Known types become typed
//! events; unknown types degrade to [`InboundEvent::Unrecognized`] so a provider
//! schema change never breaks ingestion.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const MESSAGE_EVENT: &str = "v1.conversation.message";
pub const ENDED_EVENT: &str = "v1.conversation.ended";
pub const CREATED_EVENT: &str = "v1.conversation.created";

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed event: {0}")]
    Malformed(String),
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    EndUser,
    AiAgent,
    HumanAgent,
    #[serde(other)]
    Other,
}

impl AuthorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorRole::EndUser => "end_user",
            AuthorRole::AiAgent => "ai_agent",
            AuthorRole::HumanAgent => "human_agent",
            AuthorRole::Other => "other",
        }
    }

    fn default_name(&self) -> &'static str {
        match self {
            AuthorRole::AiAgent => "AI Agent",
            AuthorRole::HumanAgent => "Human Agent",
            _ => "End User",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub id: Option<String>,
    pub role: AuthorRole,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Author {
    /// Human label shown by surfaces, e.g. `"Jane Smith (u-42)"` or `"AI Agent (ai_agent)"`.
    pub fn label(&self) -> String {
        let name = self
            .display_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.role.default_name());
        let who = self.id.as_deref().unwrap_or_else(|| self.role.as_str());
        format!("{} ({})", name, who)
    }
}

/// Message payload. Presence carries only display text and is routed to notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        body: String,
    },
    Link {
        url: String,
        /// Provider sends snake_case; surface frames are camelCase.
        #[serde(default, rename(serialize = "linkText"))]
        link_text: Option<String>,
    },
    Presence {
        body: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub message_id: Option<String>,
    pub conversation_id: String,
    pub channel_id: Option<String>,
    pub end_user_id: Option<String>,
    pub author: Author,
    pub content: MessageContent,
    /// Provider-assigned; used only for ordering.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndedBy {
    #[serde(default)]
    pub id: Option<String>,
    pub role: AuthorRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEndedEvent {
    pub conversation_id: String,
    pub channel_id: Option<String>,
    pub end_user_id: Option<String>,
    pub ended_by: Option<EndedBy>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationCreatedEvent {
    pub conversation_id: String,
    pub channel_id: Option<String>,
    pub end_user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(MessageEvent),
    ConversationEnded(ConversationEndedEvent),
    ConversationCreated(ConversationCreatedEvent),
    /// Forward-compatible catch-all; logged, never delivered.
    Unrecognized { kind: String },
}

impl InboundEvent {
    pub fn kind(&self) -> &str {
        match self {
            InboundEvent::Message(_) => MESSAGE_EVENT,
            InboundEvent::ConversationEnded(_) => ENDED_EVENT,
            InboundEvent::ConversationCreated(_) => CREATED_EVENT,
            InboundEvent::Unrecognized { kind } => kind.as_str(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    /// Left raw; only known kinds interpret it.
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChannelRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    #[serde(default)]
    message_id: Option<String>,
    conversation_id: String,
    #[serde(default)]
    end_user_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    channel: Option<ChannelRef>,
    author: Author,
    content: MessageContent,
}

#[derive(Debug, Deserialize)]
struct EndedData {
    conversation_id: String,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    end_user_id: Option<String>,
    #[serde(default)]
    ended_by: Option<EndedBy>,
}

#[derive(Debug, Deserialize)]
struct CreatedData {
    conversation_id: String,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    end_user_id: Option<String>,
}

fn data_as<T: serde::de::DeserializeOwned>(kind: &str, data: serde_json::Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|e| EventError::Malformed(format!("{}: {}", kind, e)))
}

/// Epoch values above this are taken as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 2e10;

/// Accepts RFC 3339, an offset-less ISO 8601 time (read as UTC), or epoch
/// seconds/milliseconds.
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        serde_json::Value::Number(n) => {
            let secs = n.as_f64()?;
            let millis = if secs.abs() > EPOCH_MILLIS_THRESHOLD {
                secs
            } else {
                secs * 1000.0
            };
            Utc.timestamp_millis_opt(millis.round() as i64).single()
        }
        _ => None,
    }
}

fn require_timestamp(kind: &str, ts: Option<&serde_json::Value>) -> Result<DateTime<Utc>, EventError> {
    let value = ts.ok_or_else(|| EventError::Malformed(format!("{}: missing timestamp", kind)))?;
    parse_timestamp(value)
        .ok_or_else(|| EventError::Malformed(format!("{}: invalid timestamp {}", kind, value)))
}

/// Parse a raw webhook body into exactly one [`InboundEvent`].
pub fn parse_event(raw: &[u8]) -> Result<InboundEvent, EventError> {
    let env: Envelope =
        serde_json::from_slice(raw).map_err(|e| EventError::Malformed(e.to_string()))?;
    match env.kind.as_str() {
        MESSAGE_EVENT => {
            let timestamp = require_timestamp(&env.kind, env.timestamp.as_ref())?;
            let d: MessageData = data_as(&env.kind, env.data)?;
            Ok(InboundEvent::Message(MessageEvent {
                message_id: d.message_id,
                conversation_id: d.conversation_id,
                channel_id: d.channel_id.or(d.channel.map(|c| c.id)),
                end_user_id: d.end_user_id,
                author: d.author,
                content: d.content,
                timestamp,
            }))
        }
        ENDED_EVENT => {
            let timestamp = require_timestamp(&env.kind, env.timestamp.as_ref())?;
            let d: EndedData = data_as(&env.kind, env.data)?;
            Ok(InboundEvent::ConversationEnded(ConversationEndedEvent {
                conversation_id: d.conversation_id,
                channel_id: d.channel_id,
                end_user_id: d.end_user_id,
                ended_by: d.ended_by,
                timestamp,
            }))
        }
        CREATED_EVENT => {
            let timestamp = require_timestamp(&env.kind, env.timestamp.as_ref())?;
            let d: CreatedData = data_as(&env.kind, env.data)?;
            Ok(InboundEvent::ConversationCreated(ConversationCreatedEvent {
                conversation_id: d.conversation_id,
                channel_id: d.channel_id,
                end_user_id: d.end_user_id,
                timestamp,
            }))
        }
        _ => Ok(InboundEvent::Unrecognized { kind: env.kind.clone() }),
    }
}
