//! Ingest: classify a verified webhook body and route it.
//!
//! Messages go through the aggregation queue; conversation-ended goes straight to
//! the dispatcher so it is never held behind a debounce window.

use crate::aggregator::Aggregator;
use crate::dispatch::Dispatcher;
use crate::events::{parse_event, EventError, InboundEvent};
use std::sync::Arc;

/// Which path an ingested event took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Queued,
    Ended,
    Created,
    Ignored,
}

#[derive(Clone)]
pub struct Ingestor {
    aggregator: Aggregator,
    dispatcher: Arc<Dispatcher>,
}

impl Ingestor {
    pub fn new(aggregator: Aggregator, dispatcher: Arc<Dispatcher>) -> Self {
        Self { aggregator, dispatcher }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Parse and route one raw payload. Only malformed payloads are errors.
    pub async fn ingest(&self, raw: &[u8]) -> Result<IngestOutcome, EventError> {
        let event = match parse_event(raw) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("ingest: dropping event: {}", e);
                return Err(e);
            }
        };
        Ok(self.route(event).await)
    }

    pub async fn route(&self, event: InboundEvent) -> IngestOutcome {
        log::trace!("ingest: routing {}", event.kind());
        match event {
            InboundEvent::Message(msg) => {
                log::debug!(
                    "ingest: message {} for conversation {}",
                    msg.message_id.as_deref().unwrap_or("-"),
                    msg.conversation_id
                );
                self.aggregator.enqueue(msg).await;
                IngestOutcome::Queued
            }
            InboundEvent::ConversationEnded(ended) => {
                self.dispatcher.handle_conversation_ended(&ended).await;
                IngestOutcome::Ended
            }
            InboundEvent::ConversationCreated(created) => {
                self.dispatcher.handle_conversation_created(&created);
                IngestOutcome::Created
            }
            InboundEvent::Unrecognized { kind } => {
                log::debug!("ingest: unsupported event type {}", kind);
                IngestOutcome::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::DEFAULT_DEBOUNCE;
    use crate::sinks::registry::testing::{Delivered, RecordingSink};
    use crate::sinks::SinkRegistry;
    use serde_json::json;
    use std::time::Duration;

    async fn setup() -> (Ingestor, Arc<RecordingSink>) {
        let registry = Arc::new(SinkRegistry::new());
        let sink = RecordingSink::new("u1");
        registry.register("c1".into(), sink.clone()).await.unwrap();
        let dispatcher = Arc::new(Dispatcher::new(registry));
        let aggregator = Aggregator::new(dispatcher.clone(), DEFAULT_DEBOUNCE);
        (Ingestor::new(aggregator, dispatcher), sink)
    }

    fn message(id: &str, ts: &str, body: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "v1.conversation.message",
            "timestamp": ts,
            "data": {
                "message_id": id,
                "conversation_id": "c1",
                "author": { "id": "u2", "role": "ai_agent" },
                "content": { "type": "text", "body": body }
            }
        }))
        .unwrap()
    }

    fn ended() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "v1.conversation.ended",
            "timestamp": "2024-05-01T10:00:04Z",
            "data": { "conversation_id": "c1", "ended_by": { "role": "end_user" } }
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_pair_is_delivered_sorted() {
        let (ingestor, sink) = setup().await;
        let first = ingestor.ingest(&message("m1", "2024-05-01T10:00:03Z", "hi")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        ingestor.ingest(&message("m2", "2024-05-01T10:00:01Z", "yo")).await.unwrap();
        assert_eq!(first, IngestOutcome::Queued);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(sink.bodies(), vec!["yo", "hi"]);
    }

    #[tokio::test(start_paused = true)]
    async fn ended_mid_debounce_disables_and_batch_still_lands() {
        let (ingestor, sink) = setup().await;
        ingestor.ingest(&message("m1", "2024-05-01T10:00:03Z", "last words")).await.unwrap();
        let outcome = ingestor.ingest(&ended()).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Ended);
        assert!(sink.is_disabled());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(sink.is_disabled());
        assert_eq!(sink.delivered().first(), Some(&Delivered::Disabled));
        assert_eq!(sink.bodies(), vec!["last words"]);
    }

    #[tokio::test]
    async fn created_and_unknown_types_are_not_queued() {
        let (ingestor, sink) = setup().await;
        let created = serde_json::to_vec(&json!({
            "type": "v1.conversation.created",
            "timestamp": "2024-05-01T10:00:00Z",
            "data": { "conversation_id": "c1", "channel_id": "ch", "end_user_id": "u1" }
        }))
        .unwrap();
        let unknown = br#"{"type":"v1.channel.updated","timestamp":"2024-05-01T10:00:00Z","data":{}}"#;

        assert_eq!(ingestor.ingest(&created).await.unwrap(), IngestOutcome::Created);
        assert_eq!(ingestor.ingest(unknown).await.unwrap(), IngestOutcome::Ignored);
        assert_eq!(ingestor.aggregator().pending_len().await, 0);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn unknown_type_with_epoch_timestamp_is_ignored() {
        let (ingestor, sink) = setup().await;
        let unknown = br#"{"type":"v1.channel.updated","timestamp":1714557600,"data":{}}"#;
        assert_eq!(ingestor.ingest(unknown).await.unwrap(), IngestOutcome::Ignored);
        assert_eq!(ingestor.aggregator().pending_len().await, 0);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn malformed_is_rejected_without_queueing() {
        let (ingestor, _sink) = setup().await;
        let bad = br#"{"type":"v1.conversation.message","timestamp":"2024-05-01T10:00:00Z","data":{}}"#;
        assert!(ingestor.ingest(bad).await.is_err());
        assert_eq!(ingestor.aggregator().pending_len().await, 0);
    }
}
