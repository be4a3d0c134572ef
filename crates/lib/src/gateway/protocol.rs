//! Gateway WebSocket surface protocol: server → client event frames.

use crate::events::MessageContent;
use serde::{Deserialize, Serialize};

/// Query params for `GET /ws`: which conversation to observe and as which end user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceParams {
    pub conversation_id: String,
    pub end_user_id: String,
}

/// Events pushed to a surface: `{ "type": "event", "event", "payload"? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SurfaceEvent {
    Registered {
        conversation_id: String,
        end_user_id: String,
    },
    Message {
        author_id: Option<String>,
        role: String,
        label: String,
        avatar: Option<String>,
        content: MessageContent,
    },
    Notification {
        text: String,
    },
    InputDisabled,
    Shutdown,
    Error {
        message: String,
    },
}

#[derive(Debug, Serialize)]
struct EventFrame<'a> {
    #[serde(rename = "type")]
    typ: &'static str,
    #[serde(flatten)]
    event: &'a SurfaceEvent,
}

impl SurfaceEvent {
    /// Wire JSON for this event.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(&EventFrame { typ: "event", event: self })
            .unwrap_or_else(|_| r#"{"type":"event","event":"error","payload":{}}"#.to_string())
    }
}
