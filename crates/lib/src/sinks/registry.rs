//! Sink registry: register and lookup sinks by conversation id.

use crate::events::{Author, MessageContent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Delivery target for one conversation. Implementations must not block; the
/// dispatcher calls these while holding the aggregation guard.
pub trait Sink: Send + Sync {
    /// End user that owns this surface. Messages authored by this id are self-echo.
    fn end_user_id(&self) -> &str;
    /// Append a text or link message to the timeline.
    fn append_message(&self, author: &Author, content: &MessageContent);
    /// Show a transient notification (presence updates).
    fn emit_notification(&self, text: &str);
    /// Conversation ended; stop accepting input. Must be idempotent.
    fn disable_input(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("sink already registered for conversation {0}")]
    Duplicate(String),
}

/// Registry of conversation ids to sinks. Shared across the gateway.
pub struct SinkRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn Sink>>>>,
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a sink. Fails without touching the existing entry when the id is taken.
    pub async fn register(&self, conversation_id: String, sink: Arc<dyn Sink>) -> Result<(), RegistryError> {
        let mut g = self.inner.write().await;
        if g.contains_key(&conversation_id) {
            return Err(RegistryError::Duplicate(conversation_id));
        }
        log::debug!("sink registered for conversation {}", conversation_id);
        g.insert(conversation_id, sink);
        Ok(())
    }

    /// Remove the sink for a conversation; returns it if one was registered.
    pub async fn unregister(&self, conversation_id: &str) -> Option<Arc<dyn Sink>> {
        let removed = self.inner.write().await.remove(conversation_id);
        if removed.is_some() {
            log::debug!("sink unregistered for conversation {}", conversation_id);
        }
        removed
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Arc<dyn Sink>> {
        let g = self.inner.read().await;
        g.get(conversation_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
