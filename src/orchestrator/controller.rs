//! Run lifecycle controller.
//!
//! `RunController` is the only object a simulation talks to. It resolves the
//! run identity up front, then owns a small tokio runtime whose tasks do all
//! of the network work. The producer side (`log`) is synchronous and only
//! ever serializes and enqueues.
//!
//! `start`, `shutdown` and `Drop` block the caller until setup or the drain
//! finishes, but the private runtime is only ever driven from a scoped helper
//! thread. The controller can therefore be created and dropped from inside
//! another tokio runtime.

use super::queue::{QueueItem, UploadQueue};
use super::worker::Worker;
use crate::adapter::PullAdapter;
use crate::auth::{AuthToken, CredentialStore};
use crate::error::{LogError, RunError, ShutdownError};
use crate::frame::{Frame, SimulationContext, Structure, EV_TO_K};
use crate::model::{Annotations, RunConfig, UploadJob, UploadSummary, WorkerStatus};
use crate::remote::{self, RemoteClient};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};

/// Bound on the setup calls (listing, collision probes).
const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Statuses kept for `statuses()` between polls. Older ones are discarded;
/// the summary still counts them.
pub const MAX_UNREAD_STATUSES: usize = 10_000;

/// Identity and counters of one logging session.
#[derive(Debug, Clone)]
pub struct RunSession {
    pub run_id: String,
    pub project: String,
    pub url: String,
    /// Number of frames accepted so far; the last assigned `frame_num`.
    pub frame_counter: u64,
    pub token: Option<AuthToken>,
    pub interval: u64,
    pub worker_count: usize,
}

pub struct RunController {
    session: RunSession,
    queue: UploadQueue,
    status_rx: UnboundedReceiver<WorkerStatus>,
    status_log: StatusLog,
    handles: Vec<tokio::task::JoinHandle<()>>,
    /// `None` once shut down.
    runtime: Option<tokio::runtime::Runtime>,
    drain_timeout: Option<Duration>,
    template: Option<Structure>,
}

impl RunController {
    /// Load credentials, pick a run id and spawn the upload workers.
    ///
    /// Authenticated runs fail with [`crate::error::AuthError::Missing`]
    /// before any request is made when no token has been saved.
    pub fn start(cfg: RunConfig) -> Result<Self, RunError> {
        let t0 = Instant::now();
        cfg.validate()?;

        let token = if cfg.is_authenticated() {
            let store = CredentialStore::resolve(cfg.credentials_path.as_deref())?;
            Some(store.load()?)
        } else {
            None
        };

        let template = match cfg.template.as_deref() {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| RunError::Template {
                    path: path.to_path_buf(),
                    source,
                })?;
                Some(Structure::from_pdb(&text)?)
            }
            None => None,
        };

        let setup_client = RemoteClient::new(cfg.endpoints.clone(), SETUP_TIMEOUT)?;
        let upload_client = RemoteClient::new(cfg.endpoints.clone(), cfg.upload_timeout)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(cfg.worker_count)
            .thread_name("logmd-upload")
            .enable_all()
            .build()
            .map_err(RunError::Runtime)?;

        let allocated = off_caller_thread(|| {
            runtime.block_on(remote::allocate(&setup_client, &cfg.project, token.as_ref()))
        });
        let identity = match allocated {
            Ok(identity) => identity,
            Err(_) => {
                runtime.shutdown_background();
                return Err(RunError::SetupPanicked);
            }
        };

        let queue = UploadQueue::new();
        let (status_tx, status_rx) = mpsc::unbounded_channel::<WorkerStatus>();
        let mut handles = Vec::with_capacity(cfg.worker_count);
        for id in 0..cfg.worker_count {
            let worker = Worker {
                id,
                queue: queue.clone(),
                status_tx: status_tx.clone(),
                client: upload_client.clone(),
                token: token.clone(),
                project: cfg.project.clone(),
            };
            handles.push(runtime.spawn(worker.run()));
        }

        info!(
            load_time = ?t0.elapsed(),
            workers = cfg.worker_count,
            url = %identity.url,
            "run started"
        );

        Ok(Self {
            session: RunSession {
                run_id: identity.run_id,
                project: cfg.project,
                url: identity.url,
                frame_counter: 0,
                token,
                interval: cfg.interval,
                worker_count: cfg.worker_count,
            },
            queue,
            status_rx,
            status_log: StatusLog::new(MAX_UNREAD_STATUSES),
            handles,
            runtime: Some(runtime),
            drain_timeout: cfg.drain_timeout,
            template,
        })
    }

    pub fn session(&self) -> &RunSession {
        &self.session
    }

    pub fn run_id(&self) -> &str {
        &self.session.run_id
    }

    pub fn url(&self) -> &str {
        &self.session.url
    }

    pub fn frame_count(&self) -> u64 {
        self.session.frame_counter
    }

    pub fn is_shut_down(&self) -> bool {
        self.runtime.is_none()
    }

    /// Pull-style adapter over the configured template, if there is one.
    pub fn pull_adapter(&self) -> Option<PullAdapter> {
        self.template
            .clone()
            .map(|t| PullAdapter::new(t, self.session.interval))
    }

    /// Queue one frame for upload and return its `frame_num`.
    ///
    /// Only serialization happens on the caller's thread. A frame that fails
    /// to serialize is not counted.
    pub fn log<F: Frame + ?Sized>(
        &mut self,
        frame: &F,
        context: Option<&dyn SimulationContext>,
        annotations: Option<Annotations>,
    ) -> Result<u64, LogError> {
        if self.is_shut_down() {
            return Err(LogError::Closed);
        }
        self.collect_statuses();
        let payload = frame.to_pdb()?;
        let annotations = build_annotations(
            annotations.unwrap_or_default(),
            context,
            frame.potential_energy().unwrap_or(0.0),
        );

        let frame_num = self.session.frame_counter + 1;
        let job = UploadJob {
            payload,
            frame_num,
            run_id: self.session.run_id.clone(),
            annotations,
        };
        self.queue
            .push(QueueItem::Job(job))
            .map_err(|_| LogError::Closed)?;
        self.session.frame_counter = frame_num;
        Ok(frame_num)
    }

    /// Statuses recorded by workers since the last call, oldest first. At
    /// most [`MAX_UNREAD_STATUSES`] are held between calls.
    pub fn statuses(&mut self) -> Vec<WorkerStatus> {
        self.collect_statuses();
        self.status_log.take()
    }

    fn collect_statuses(&mut self) {
        while let Ok(status) = self.status_rx.try_recv() {
            self.status_log.record(status);
        }
    }

    /// Signal every worker to stop and wait until all queued frames have been
    /// attempted. Calling it again is a no-op that returns the same summary.
    pub fn shutdown(&mut self) -> Result<UploadSummary, ShutdownError> {
        let Some(runtime) = self.runtime.take() else {
            return Ok(self.status_log.summary);
        };
        info!(url = %self.session.url, "finishing uploads");

        for _ in 0..self.session.worker_count {
            if self.queue.push(QueueItem::Terminate).is_err() {
                break;
            }
        }

        let handles = std::mem::take(&mut self.handles);
        let drain_timeout = self.drain_timeout;
        let joined = off_caller_thread(move || {
            let joined = runtime.block_on(async move {
                let all = futures::future::join_all(handles);
                match drain_timeout {
                    Some(limit) => tokio::time::timeout(limit, all).await.map_err(|_| limit),
                    None => Ok(all.await),
                }
            });
            // Leftover connection tasks must not hold up process exit.
            runtime.shutdown_background();
            joined
        });

        let result = match joined {
            Ok(Ok(results)) => {
                let panicked = results.iter().filter(|r| r.is_err()).count();
                if panicked == 0 {
                    Ok(())
                } else {
                    Err(ShutdownError::WorkerPanicked(panicked))
                }
            }
            Ok(Err(limit)) => Err(ShutdownError::Timeout(limit)),
            Err(_) => Err(ShutdownError::DrainPanicked),
        };
        self.collect_statuses();

        match &result {
            Ok(()) => info!(
                url = %self.session.url,
                attempted = self.status_log.summary.attempted,
                accepted = self.status_log.summary.accepted,
                failed = self.status_log.summary.failed,
                "uploads finished"
            ),
            Err(e) => warn!(url = %self.session.url, error = %e, "upload drain incomplete"),
        }
        result.map(|()| self.status_log.summary)
    }
}

/// Run `f` on a scoped thread and wait for it. `Runtime::block_on` panics on
/// a thread that is already inside a runtime, and the caller may be one.
fn off_caller_thread<T, F>(f: F) -> std::thread::Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    std::thread::scope(|s| s.spawn(f).join())
}

/// Worker statuses received but not yet handed out, plus the running tally.
#[derive(Debug)]
struct StatusLog {
    unread: VecDeque<WorkerStatus>,
    cap: usize,
    summary: UploadSummary,
}

impl StatusLog {
    fn new(cap: usize) -> Self {
        Self {
            unread: VecDeque::new(),
            cap,
            summary: UploadSummary::default(),
        }
    }

    fn record(&mut self, status: WorkerStatus) {
        self.summary.record(&status);
        if self.unread.len() == self.cap {
            self.unread.pop_front();
        }
        self.unread.push_back(status);
    }

    fn take(&mut self) -> Vec<WorkerStatus> {
        self.unread.drain(..).collect()
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        if !self.is_shut_down() {
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "shutdown on drop failed");
            }
        }
    }
}

/// Merge caller annotations with the engine readouts. Energy always wins
/// over a caller-supplied `energy` key.
fn build_annotations(
    mut annotations: Annotations,
    context: Option<&dyn SimulationContext>,
    energy_ev: f64,
) -> Annotations {
    if let Some(ctx) = context {
        annotations.insert(
            "simulation_time".into(),
            format!("{} [ps]", format_float(ctx.time_ps())),
        );
        annotations.insert(
            "temperature".into(),
            format!("{} [K]", format_float(ctx.temperature_ev() * EV_TO_K)),
        );
    }
    annotations.insert("energy".into(), format!("{} [eV]", format_float(energy_ev)));
    annotations
}

/// Shortest round-trippable text in Python's `repr` layout: a decimal point
/// on integral values (`1.0`), a signed two-digit exponent outside
/// `1e-4..1e16` (`1e+20`, `1.5e-07`), and `nan`/`inf` for the rest.
fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.into();
    }
    let magnitude = v.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let sci = format!("{v:e}");
        if let Some((mantissa, exp)) = sci.split_once('e') {
            if let Ok(exp) = exp.parse::<i32>() {
                let sign = if exp < 0 { '-' } else { '+' };
                return format!("{mantissa}e{sign}{:02}", exp.unsigned_abs());
            }
        }
        return sci;
    }
    let plain = v.to_string();
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}
