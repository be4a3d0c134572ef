//! Dispatcher: orders a flushed batch and delivers each message to its conversation's sink.
//!
//! Conversation-ended events skip the aggregation queue and are delivered here directly.

use crate::events::{ConversationCreatedEvent, ConversationEndedEvent, MessageContent, MessageEvent};
use crate::sinks::SinkRegistry;
use std::sync::Arc;

pub struct Dispatcher {
    registry: Arc<SinkRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SinkRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver a batch in timestamp order. Ties keep arrival order.
    pub async fn flush_batch(&self, mut batch: Vec<MessageEvent>) {
        if batch.is_empty() {
            return;
        }
        log::debug!("dispatch: flushing {} message(s)", batch.len());
        batch.sort_by_key(|m| m.timestamp);
        for msg in &batch {
            self.deliver(msg).await;
        }
    }

    async fn deliver(&self, msg: &MessageEvent) {
        let Some(sink) = self.registry.get(&msg.conversation_id).await else {
            log::debug!("dispatch: no sink for conversation {}, dropping", msg.conversation_id);
            return;
        };
        if msg.author.id.as_deref() == Some(sink.end_user_id()) {
            // self-echo
            return;
        }
        match &msg.content {
            MessageContent::Presence { body } => sink.emit_notification(body),
            MessageContent::Text { .. } | MessageContent::Link { .. } => {
                sink.append_message(&msg.author, &msg.content)
            }
        }
    }

    /// Disable input on the conversation's sink, if one is registered.
    pub async fn handle_conversation_ended(&self, event: &ConversationEndedEvent) {
        match self.registry.get(&event.conversation_id).await {
            Some(sink) => {
                log::info!("conversation {} ended, disabling input", event.conversation_id);
                sink.disable_input();
            }
            None => log::debug!(
                "conversation {} ended with no sink registered",
                event.conversation_id
            ),
        }
    }

    pub fn handle_conversation_created(&self, event: &ConversationCreatedEvent) {
        log::info!(
            "conversation {} created (channel {}, end user {})",
            event.conversation_id,
            event.channel_id.as_deref().unwrap_or("-"),
            event.end_user_id.as_deref().unwrap_or("-"),
        );
    }
}
