//! Aggregation queue: buffers message events and flushes them after a quiet period.
//!
//! Trailing-edge debounce. Every enqueue restarts the window, so the flush fires
//! `delay` after the *last* arrival. A burst whose gaps stay under `delay` keeps
//! postponing delivery; there is no maximum wait.
//!
//! The buffer, the handle of the single outstanding flush task, and a generation
//! counter live behind one mutex. Enqueue, the swap, and delivery of the swapped
//! batch all happen under that mutex, so a batch is fully delivered before the
//! next one can be formed and no event is attributed to two batches.

use crate::dispatch::Dispatcher;
use crate::events::MessageEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Default)]
struct PendingBatch {
    buffer: Vec<MessageEvent>,
    flush_task: Option<JoinHandle<()>>,
    /// Bumped on every reschedule; a flush task only swaps if its generation is current.
    generation: u64,
}

struct Inner {
    pending: Mutex<PendingBatch>,
    dispatcher: Arc<Dispatcher>,
    delay: Duration,
}

/// Debounced accumulator in front of the [`Dispatcher`]. Cheap to clone.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<Inner>,
}

impl Aggregator {
    pub fn new(dispatcher: Arc<Dispatcher>, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(PendingBatch::default()),
                dispatcher,
                delay,
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Append an event and restart the debounce window.
    pub async fn enqueue(&self, event: MessageEvent) {
        let mut pending = self.inner.pending.lock().await;
        pending.buffer.push(event);

        if let Some(task) = pending.flush_task.take() {
            log::debug!("aggregator: rescheduling flush ({} pending)", pending.buffer.len());
            task.abort();
        } else {
            log::debug!("aggregator: scheduling flush");
        }

        pending.generation = pending.generation.wrapping_add(1);
        let generation = pending.generation;
        let inner = self.inner.clone();
        pending.flush_task = Some(tokio::spawn(async move {
            inner.flush_after_delay(generation).await;
        }));
    }

    /// Cancel any scheduled flush and deliver everything buffered right now.
    pub async fn flush_now(&self) {
        let mut pending = self.inner.pending.lock().await;
        if let Some(task) = pending.flush_task.take() {
            task.abort();
        }
        pending.generation = pending.generation.wrapping_add(1);
        let batch = std::mem::take(&mut pending.buffer);
        if !batch.is_empty() {
            log::info!("aggregator: flushing {} buffered message(s) immediately", batch.len());
        }
        self.inner.dispatcher.flush_batch(batch).await;
    }

    /// Number of buffered events waiting for the next flush.
    pub async fn pending_len(&self) -> usize {
        self.inner.pending.lock().await.buffer.len()
    }
}

impl Inner {
    async fn flush_after_delay(self: Arc<Self>, generation: u64) {
        tokio::time::sleep(self.delay).await;

        let mut pending = self.pending.lock().await;
        if pending.generation != generation {
            // Superseded while waiting for the lock; the newer task owns the buffer.
            return;
        }
        let batch = std::mem::take(&mut pending.buffer);
        pending.flush_task = None;
        log::debug!("aggregator: quiescent, flushing {} message(s)", batch.len());
        self.dispatcher.flush_batch(batch).await;
    }
}
