//! Upload pipeline.
//!
//! The producer enqueues jobs on an [`UploadQueue`]; `worker_count` workers
//! pop and POST them independently, so delivery order across workers is not
//! preserved. The controller owns all of it and drains the queue on shutdown.

mod controller;
mod queue;
mod worker;

pub use controller::{RunController, RunSession};
pub use queue::{QueueItem, UploadQueue};
