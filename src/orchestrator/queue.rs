use crate::model::UploadJob;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum QueueItem {
    Job(UploadJob),
    /// Tells exactly one worker to exit.
    Terminate,
}

/// Unbounded FIFO shared by the producer and every worker.
///
/// `push` never blocks. Consumers take turns on the receiving end; a worker
/// only holds the receiver while waiting for the next item, never while
/// uploading.
#[derive(Debug, Clone)]
pub struct UploadQueue {
    tx: UnboundedSender<QueueItem>,
    rx: Arc<Mutex<UnboundedReceiver<QueueItem>>>,
}

impl UploadQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Returns the item back if every consumer handle is gone.
    pub fn push(&self, item: QueueItem) -> Result<(), QueueItem> {
        self.tx.send(item).map_err(|e| e.0)
    }

    /// Wait for the next item. `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<QueueItem> {
        self.rx.lock().await.recv().await
    }
}

impl Default for UploadQueue {
    fn default() -> Self {
        Self::new()
    }
}
