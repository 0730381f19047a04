use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_WORKER_COUNT: usize = 3;
pub const DEFAULT_INTERVAL: u64 = 100;
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(180);

pub const DEFAULT_API_BASE: &str = "https://api.rcsb.ai/logmd";
pub const DEFAULT_FRONTEND_BASE: &str = "https://rcsb.ai/logmd";
pub const DEFAULT_STORAGE_BASE: &str = "https://logmd.b-cdn.net";

/// String annotations attached to a frame (`data_dict` on the wire).
pub type Annotations = BTreeMap<String, String>;

/// Remote service addresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoints {
    pub api_base: Url,
    pub frontend_base: Url,
    pub storage_base: Url,
}

impl Endpoints {
    pub fn parse(api: &str, frontend: &str, storage: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base: parse_url("api", api)?,
            frontend_base: parse_url("frontend", frontend)?,
            storage_base: parse_url("storage", storage)?,
        })
    }

    pub fn upload_url(&self) -> Url {
        join_segments(&self.api_base, &["upload"])
    }

    /// One-shot trajectory upload; answers with the new run's id.
    pub fn upload_single_file_url(&self) -> Url {
        join_segments(&self.api_base, &["upload_single_file"])
    }

    pub fn list_project_files_url(&self) -> Url {
        join_segments(&self.api_base, &["list_project_files"])
    }

    /// Public storage location for an anonymous run, with trailing slash.
    pub fn probe_url(&self, run_id: &str) -> Url {
        join_segments(&self.storage_base, &["public", run_id, ""])
    }

    /// Viewer URL for a run, with the project segment when there is one.
    pub fn run_url(&self, project: &str, run_id: &str) -> Url {
        if project.is_empty() {
            join_segments(&self.frontend_base, &[run_id])
        } else {
            join_segments(&self.frontend_base, &[project, run_id])
        }
    }

    pub fn login_url(&self) -> Url {
        join_segments(&self.frontend_base, &["auth"])
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        // The constants are known-good absolute URLs.
        Self::parse(DEFAULT_API_BASE, DEFAULT_FRONTEND_BASE, DEFAULT_STORAGE_BASE)
            .unwrap_or_else(|e| panic!("default endpoints are invalid: {e}"))
    }
}

fn parse_url(which: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        which,
        value: raw.to_string(),
        source,
    })
}

/// Append path segments to `base`, keeping whatever path it already has.
fn join_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        path.extend(segments);
    }
    url
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub worker_count: usize,
    /// Empty means an anonymous, public run.
    #[serde(default)]
    pub project: String,
    pub interval: u64,
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub upload_timeout: Duration,
    #[serde(default, with = "humantime_serde")]
    pub drain_timeout: Option<Duration>,
    pub endpoints: Endpoints,
    /// Overrides the default credential file location.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            project: String::new(),
            interval: DEFAULT_INTERVAL,
            template: None,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            drain_timeout: None,
            endpoints: Endpoints::default(),
            credentials_path: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        !self.project.is_empty()
    }
}

/// One frame on its way to the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub payload: String,
    pub frame_num: u64,
    pub run_id: String,
    pub annotations: Annotations,
}

/// Outcome of one upload attempt. `status == 0` means no HTTP response
/// was received (timeout or transport error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub frame_num: u64,
    pub status: u16,
}

impl WorkerStatus {
    pub fn accepted(&self) -> bool {
        self.status == 200
    }
}

/// Tally of the statuses seen while draining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub attempted: u64,
    pub accepted: u64,
    pub failed: u64,
}

impl UploadSummary {
    pub fn record(&mut self, status: &WorkerStatus) {
        self.attempted += 1;
        if status.accepted() {
            self.accepted += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_url_has_project_segment_only_when_set() {
        let endpoints =
            Endpoints::parse("http://api.test/v1", "http://view.test/app", "http://cdn.test")
                .unwrap();
        assert_eq!(
            endpoints.run_url("", "abc123").as_str(),
            "http://view.test/app/abc123"
        );
        assert_eq!(
            endpoints.run_url("demo", "red-fox-2").as_str(),
            "http://view.test/app/demo/red-fox-2"
        );
    }

    #[test]
    fn api_paths_extend_base_path() {
        let endpoints =
            Endpoints::parse("http://api.test/v1/", "http://view.test", "http://cdn.test")
                .unwrap();
        assert_eq!(endpoints.upload_url().as_str(), "http://api.test/v1/upload");
        assert_eq!(
            endpoints.list_project_files_url().as_str(),
            "http://api.test/v1/list_project_files"
        );
        assert_eq!(
            endpoints.probe_url("0123456789").as_str(),
            "http://cdn.test/public/0123456789/"
        );
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let cfg = RunConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::NoWorkers)));
    }

    #[test]
    fn config_round_trips_humantime_durations() {
        let cfg = RunConfig {
            drain_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["upload_timeout"], "3m");
        let back: RunConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.drain_timeout, Some(Duration::from_secs(5)));
        assert_eq!(back.worker_count, DEFAULT_WORKER_COUNT);
    }

    #[test]
    fn summary_counts_failures() {
        let mut summary = UploadSummary::default();
        for (frame_num, status) in [(1, 200), (2, 500), (3, 0)] {
            summary.record(&WorkerStatus { frame_num, status });
        }
        assert_eq!(
            summary,
            UploadSummary {
                attempted: 3,
                accepted: 1,
                failed: 2,
            }
        );
    }
}
