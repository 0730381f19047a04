use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no login token found at {path}, run `logmd login` first")]
    Missing { path: PathBuf },
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("could not determine a home directory for the credential file")]
    NoHome,
    #[error("credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker_count must be at least 1")]
    NoWorkers,
    #[error("interval must be at least 1 step")]
    ZeroInterval,
    #[error("invalid {which} url `{value}`: {source}")]
    InvalidUrl {
        which: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("no atoms found")]
    Empty,
    #[error("expected {expected} positions, got {actual}")]
    AtomCount { expected: usize, actual: usize },
}

/// Errors returned to the producer by `RunController::log`.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("run is already shut down")]
    Closed,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("uploads still pending after {0:?}, giving up on the drain")]
    Timeout(Duration),
    #[error("{0} upload worker(s) panicked")]
    WorkerPanicked(usize),
    #[error("upload drain thread panicked")]
    DrainPanicked,
}

/// Failures while constructing a `RunController`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to start upload runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("run id allocation panicked")]
    SetupPanicked,
}

/// Failures of the one-shot trajectory upload.
#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("trajectory has no frames")]
    Empty,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("failed to build trajectory archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to write trajectory archive: {0}")]
    ArchiveIo(#[from] std::io::Error),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upload rejected with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("upload response carried no run_id")]
    MissingRunId,
}
