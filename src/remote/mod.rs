//! HTTP contract with the viewer service.

mod run_id;
mod trajectory;

pub use run_id::{allocate, RunIdentity, MAX_PROBE_ATTEMPTS};
pub use trajectory::{pack_trajectory, TRAJECTORY_ENTRY};

use crate::auth::AuthToken;
use crate::model::{Annotations, Endpoints, UploadJob};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anonymous uploads are filed under this user id.
pub const PUBLIC_USER: &str = "public";

/// Failure of one of the non-fatal setup calls (probe or listing).
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("service error: {0}")]
    Service(String),
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    user_id: &'a str,
    run_id: &'a str,
    frame_num: String,
    file_contents: &'a str,
    token: Option<&'a str>,
    project: &'a str,
    data_dict: &'a Annotations,
}

#[derive(Debug, Serialize)]
struct ListProjectFilesRequest<'a> {
    user_id: &'a str,
    token: &'a str,
    project: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListProjectFilesResponse {
    #[serde(default)]
    projects: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl RemoteClient {
    /// `timeout` bounds every request made through this client.
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("logmd/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// POST one frame. Returns the response status; the body is ignored.
    pub async fn upload(
        &self,
        job: &UploadJob,
        token: Option<&AuthToken>,
        project: &str,
    ) -> Result<StatusCode, reqwest::Error> {
        let body = UploadRequest {
            user_id: token.map(|t| t.email.as_str()).unwrap_or(PUBLIC_USER),
            run_id: &job.run_id,
            frame_num: job.frame_num.to_string(),
            file_contents: &job.payload,
            token: token.map(|t| t.secret.as_str()),
            project,
            data_dict: &job.annotations,
        };
        let resp = self
            .http
            .post(self.endpoints.upload_url())
            .json(&body)
            .send()
            .await?;
        Ok(resp.status())
    }

    /// Number of runs already stored in `project`.
    pub async fn count_project_files(
        &self,
        token: &AuthToken,
        project: &str,
    ) -> Result<usize, ProbeError> {
        let body = ListProjectFilesRequest {
            user_id: &token.email,
            token: &token.secret,
            project,
        };
        let resp = self
            .http
            .post(self.endpoints.list_project_files_url())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProbeError::Status { status, body });
        }
        let parsed: ListProjectFilesResponse = resp.json().await?;
        match (parsed.projects, parsed.error) {
            (Some(files), _) => Ok(files.len()),
            (None, Some(err)) => Err(ProbeError::Service(err)),
            (None, None) => Err(ProbeError::Service("Unknown error".into())),
        }
    }

    /// Whether public storage already holds a run called `run_id`.
    pub async fn run_id_taken(&self, run_id: &str) -> Result<bool, ProbeError> {
        let resp = self.http.head(self.endpoints.probe_url(run_id)).send().await?;
        Ok(resp.status() == StatusCode::OK)
    }
}
