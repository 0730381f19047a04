//! One-shot upload of a whole trajectory.
//!
//! The rendered PDB is zipped, base64 encoded and sent in a single request.
//! The service creates the run itself and answers with its id.

use super::{RemoteClient, RunIdentity};
use crate::error::TrajectoryError;
use crate::frame::Trajectory;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the PDB entry inside the uploaded archive.
pub const TRAJECTORY_ENTRY: &str = "trajectory_analysis.pdb";

const COMPRESSION_LEVEL: i64 = 5;

#[derive(Debug, Serialize)]
struct SingleFileRequest {
    file_contents: String,
}

#[derive(Debug, Deserialize)]
struct SingleFileResponse {
    #[serde(default)]
    run_id: Option<String>,
}

/// Deflate `pdb` into a one-entry zip archive and base64 encode it.
pub fn pack_trajectory(pdb: &str) -> Result<String, TrajectoryError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file(TRAJECTORY_ENTRY, options)?;
    zip.write_all(pdb.as_bytes())?;
    let archive = zip.finish()?.into_inner();
    Ok(STANDARD.encode(archive))
}

impl RemoteClient {
    /// Upload every frame of `trajectory` as one new run.
    pub async fn upload_trajectory(
        &self,
        trajectory: &Trajectory,
    ) -> Result<RunIdentity, TrajectoryError> {
        if trajectory.is_empty() {
            return Err(TrajectoryError::Empty);
        }
        let body = SingleFileRequest {
            file_contents: pack_trajectory(trajectory.as_pdb())?,
        };
        info!(
            frames = trajectory.len(),
            encoded_bytes = body.file_contents.len(),
            "uploading trajectory"
        );

        let resp = self
            .http
            .post(self.endpoints.upload_single_file_url())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(TrajectoryError::Rejected { status, body });
        }

        let parsed: SingleFileResponse = resp.json().await?;
        let run_id = parsed
            .run_id
            .filter(|id| !id.is_empty())
            .ok_or(TrajectoryError::MissingRunId)?;
        let url = self.endpoints.run_url("", &run_id).to_string();
        Ok(RunIdentity { run_id, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn archive_holds_the_pdb_deflated() {
        let pdb = "step=1\nATOM      1  N   GLY A   1\nEND\n".repeat(50);
        let encoded = pack_trajectory(&pdb).unwrap();

        let bytes = STANDARD.decode(encoded).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_name(TRAJECTORY_ENTRY).unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        assert_eq!(text, pdb);
    }
}
