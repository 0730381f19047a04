use super::queue::{QueueItem, UploadQueue};
use crate::auth::AuthToken;
use crate::model::WorkerStatus;
use crate::remote::RemoteClient;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Everything a worker owns. The token and project are its own copies.
pub(crate) struct Worker {
    pub id: usize,
    pub queue: UploadQueue,
    pub status_tx: UnboundedSender<WorkerStatus>,
    pub client: RemoteClient,
    pub token: Option<AuthToken>,
    pub project: String,
}

impl Worker {
    /// Upload jobs until a termination signal arrives. Failures are recorded
    /// and dropped; nothing is requeued.
    pub async fn run(self) {
        let mut uploaded = 0u64;
        while let Some(item) = self.queue.pop().await {
            let job = match item {
                QueueItem::Job(job) => job,
                QueueItem::Terminate => break,
            };

            let status = match self
                .client
                .upload(&job, self.token.as_ref(), &self.project)
                .await
            {
                Ok(code) => {
                    if code.as_u16() != 200 {
                        warn!(
                            worker = self.id,
                            frame_num = job.frame_num,
                            status = %code,
                            "upload rejected"
                        );
                    }
                    code.as_u16()
                }
                Err(e) => {
                    warn!(
                        worker = self.id,
                        frame_num = job.frame_num,
                        error = %e,
                        "upload failed"
                    );
                    0
                }
            };
            debug!(worker = self.id, frame_num = job.frame_num, status, "upload attempted");
            uploaded += 1;

            let _ = self.status_tx.send(WorkerStatus {
                frame_num: job.frame_num,
                status,
            });
        }
        debug!(worker = self.id, uploaded, "worker exiting");
    }
}
