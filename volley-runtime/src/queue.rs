//! Message queues connecting the pipeline stages.
use crate::pipeline::DeadLetter;
use crate::Message;
use async_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue `{0}` is closed")]
    Closed(String),
}

/// At-least-once message transport between two stages.
#[trait_variant::make(Queue: Send)]
pub trait LocalQueue {
    fn name(&self) -> &str;

    /// Enqueues `payload`, waiting while the queue is at capacity.
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError>;

    /// Waits for the next message. Fails with [`QueueError::Closed`] once the queue has been
    /// closed and fully drained.
    async fn consume(&self) -> Result<Vec<u8>, QueueError>;
}

/// In-process bounded queue. Clones share the same underlying channel.
#[derive(Clone, Debug)]
pub struct ChannelQueue {
    name: Arc<str>,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl ChannelQueue {
    pub fn bounded(name: &str, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            name: name.into(),
            tx,
            rx,
        }
    }

    /// Stops accepting new messages. Messages already enqueued can still be consumed.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Queue for ChannelQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| QueueError::Closed(self.name.to_string()))
    }

    async fn consume(&self) -> Result<Vec<u8>, QueueError> {
        self.rx
            .recv()
            .await
            .map_err(|_| QueueError::Closed(self.name.to_string()))
    }
}

/// Pushes `letter` onto the dead-letter queue. Failure to do so can only be logged.
pub(crate) async fn dead_letter<Q: Queue + Sync>(queue: &Q, letter: DeadLetter) {
    error!(
        "Dead-lettering message at stage {:?} (testId={:?}): {}",
        letter.stage, letter.test_id, letter.reason
    );

    let bytes = match Message::new(letter).to_bytes() {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Unable to encode dead letter: {err}");
            return;
        }
    };

    if let Err(err) = queue.publish(bytes).await {
        error!("Unable to publish dead letter: {err}");
    }
}
