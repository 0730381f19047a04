//! In-process stand-in for the viewer service.
//!
//! Runs an axum server on its own thread and runtime so tests can drive the
//! synchronous `RunController` from a plain `#[test]`.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{head, post};
use axum::{Json, Router};
use logmd::frame::Structure;
use logmd::{Endpoints, RunConfig};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub upload_status: u16,
    pub upload_delay: Duration,
    /// Frames held for `slow_delay` instead of `upload_delay`.
    pub slow_frames: Vec<u64>,
    pub slow_delay: Duration,
    /// Statuses returned to successive collision probes; 404 once exhausted.
    pub probe_statuses: Vec<u16>,
    /// `None` makes the listing call answer with an error object.
    pub project_files: Option<usize>,
    /// `run_id` answered by the single-file endpoint; `None` omits it.
    pub single_file_run_id: Option<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            upload_status: 200,
            upload_delay: Duration::ZERO,
            slow_frames: Vec::new(),
            slow_delay: Duration::ZERO,
            probe_statuses: Vec::new(),
            project_files: Some(0),
            single_file_run_id: Some("bulk-run".into()),
        }
    }
}

#[derive(Default)]
pub struct MockState {
    upload_status: u16,
    upload_delay: Duration,
    slow_frames: Vec<u64>,
    slow_delay: Duration,
    probe_script: Mutex<VecDeque<u16>>,
    project_files: Option<usize>,
    single_file_run_id: Option<String>,
    pub requests: AtomicUsize,
    pub uploads: Mutex<Vec<Value>>,
    pub probes: Mutex<Vec<String>>,
    pub listings: Mutex<Vec<Value>>,
    pub single_files: Mutex<Vec<Value>>,
}

pub struct MockService {
    pub addr: std::net::SocketAddr,
    pub state: Arc<MockState>,
}

impl MockService {
    pub fn spawn(cfg: MockConfig) -> Self {
        let state = Arc::new(MockState {
            upload_status: cfg.upload_status,
            upload_delay: cfg.upload_delay,
            slow_frames: cfg.slow_frames,
            slow_delay: cfg.slow_delay,
            probe_script: Mutex::new(cfg.probe_statuses.into()),
            project_files: cfg.project_files,
            single_file_run_id: cfg.single_file_run_id,
            ..Default::default()
        });

        let app = Router::new()
            .route("/api/upload", post(upload))
            .route("/api/upload_single_file", post(upload_single_file))
            .route("/api/list_project_files", post(list_project_files))
            .route("/cdn/public/:id/", head(probe))
            .with_state(state.clone());

        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("mock runtime");
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind mock");
                addr_tx.send(listener.local_addr().expect("addr")).expect("send addr");
                axum::serve(listener, app).await.expect("serve mock");
            });
        });
        let addr = addr_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("mock server did not start");

        Self { addr, state }
    }

    pub fn endpoints(&self) -> Endpoints {
        let base = format!("http://{}", self.addr);
        Endpoints::parse(
            &format!("{base}/api"),
            &format!("{base}/view"),
            &format!("{base}/cdn"),
        )
        .expect("mock endpoints")
    }

    pub fn frontend(&self) -> String {
        format!("http://{}/view", self.addr)
    }

    pub fn config(&self, worker_count: usize) -> RunConfig {
        RunConfig {
            worker_count,
            endpoints: self.endpoints(),
            upload_timeout: Duration::from_secs(10),
            ..RunConfig::default()
        }
    }

    pub fn uploads(&self) -> Vec<Value> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn single_files(&self) -> Vec<Value> {
        self.state.single_files.lock().unwrap().clone()
    }

    pub fn probes(&self) -> Vec<String> {
        self.state.probes.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }
}

async fn upload(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> StatusCode {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let delay = if state.slow_frames.contains(&frame_num(&body)) {
        state.slow_delay
    } else {
        state.upload_delay
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    state.uploads.lock().unwrap().push(body);
    StatusCode::from_u16(state.upload_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn upload_single_file(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.single_files.lock().unwrap().push(body);
    match &state.single_file_run_id {
        Some(id) => Json(json!({ "run_id": id })),
        None => Json(json!({})),
    }
}

async fn list_project_files(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.listings.lock().unwrap().push(body);
    match state.project_files {
        Some(n) => {
            let files: Vec<String> = (1..=n).map(|i| format!("run-{i}")).collect();
            Json(json!({ "projects": files }))
        }
        None => Json(json!({ "error": "project not found" })),
    }
}

async fn probe(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> StatusCode {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.probes.lock().unwrap().push(id);
    let code = state.probe_script.lock().unwrap().pop_front().unwrap_or(404);
    StatusCode::from_u16(code).unwrap_or(StatusCode::NOT_FOUND)
}

/// Two-atom frame carrying `energy`.
pub fn frame_with_energy(energy: Option<f64>) -> Structure {
    let mut s = Structure::from_pdb(
        "ATOM      1  N   GLY A   1       0.000   0.000   0.000  1.00  0.00           N\n\
         ATOM      2  CA  GLY A   1       1.458   0.000   0.000  1.00  0.00           C\n",
    )
    .expect("frame");
    s.energy = energy;
    s
}

/// `frame_num` as sent on the wire.
pub fn frame_num(body: &Value) -> u64 {
    match &body["frame_num"] {
        Value::String(s) => s.parse().expect("numeric frame_num"),
        Value::Number(n) => n.as_u64().expect("u64 frame_num"),
        other => panic!("bad frame_num {other}"),
    }
}

pub fn scratch_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("logmd-it-{}-{}", std::process::id(), name))
}
