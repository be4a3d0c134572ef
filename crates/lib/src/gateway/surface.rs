//! WebSocket surface sink: forwards deliveries to a connected client.

use crate::events::{Author, MessageContent};
use crate::gateway::protocol::SurfaceEvent;
use crate::sinks::Sink;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Sink backed by an unbounded channel drained by the socket task, so delivery never blocks.
pub struct WsSink {
    end_user_id: String,
    tx: mpsc::UnboundedSender<SurfaceEvent>,
    disabled: AtomicBool,
}

impl WsSink {
    pub fn new(end_user_id: String, tx: mpsc::UnboundedSender<SurfaceEvent>) -> Self {
        Self {
            end_user_id,
            tx,
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    fn push(&self, event: SurfaceEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("ws surface closed, dropping event");
        }
    }
}

impl Sink for WsSink {
    fn end_user_id(&self) -> &str {
        &self.end_user_id
    }

    fn append_message(&self, author: &Author, content: &MessageContent) {
        self.push(SurfaceEvent::Message {
            author_id: author.id.clone(),
            role: author.role.as_str().to_string(),
            label: author.label(),
            avatar: author.avatar.clone(),
            content: content.clone(),
        });
    }

    fn emit_notification(&self, text: &str) {
        self.push(SurfaceEvent::Notification {
            text: text.to_string(),
        });
    }

    fn disable_input(&self) {
        if !self.disabled.swap(true, Ordering::SeqCst) {
            self.push(SurfaceEvent::InputDisabled);
        }
    }
}
