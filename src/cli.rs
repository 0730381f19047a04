use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logmd::auth::CredentialStore;
use logmd::frame::{split_models, PdbText, Trajectory};
use logmd::model::{
    Endpoints, RunConfig, DEFAULT_API_BASE, DEFAULT_FRONTEND_BASE, DEFAULT_STORAGE_BASE,
    DEFAULT_WORKER_COUNT,
};
use logmd::remote::RemoteClient;
use logmd::{Annotations, RunController};
use sha2::{Digest, Sha256};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Pause between models of a multi-model upload.
const MODEL_PAUSE: Duration = Duration::from_millis(200);

const DEMOS: &[(&str, &str, &str)] = &[
    (
        "Login",
        "Learn how to login",
        "https://github.com/log-md/logmd/blob/main/demos/demo_login.py",
    ),
    (
        "ASE",
        "See how to log with ASE",
        "https://github.com/log-md/logmd/blob/main/demos/demo_ase.py",
    ),
    (
        "OpenMM",
        "See how to log with OpenMM",
        "https://github.com/log-md/logmd/blob/main/demos/demo_openmm.py",
    ),
];

#[derive(Debug, Parser, Clone)]
#[command(
    name = "logmd",
    version,
    about = "Upload molecular dynamics frames to the logmd viewer"
)]
pub struct Cli {
    /// Base URL of the upload API
    #[arg(long, global = true, env = "LOGMD_API_URL", default_value = DEFAULT_API_BASE)]
    pub api_url: String,

    /// Base URL of the web viewer
    #[arg(long, global = true, env = "LOGMD_FRONTEND_URL", default_value = DEFAULT_FRONTEND_BASE)]
    pub frontend_url: String,

    /// Base URL of public run storage
    #[arg(long, global = true, env = "LOGMD_STORAGE_URL", default_value = DEFAULT_STORAGE_BASE)]
    pub storage_url: String,

    /// Number of concurrent upload workers
    #[arg(long, global = true, default_value_t = DEFAULT_WORKER_COUNT)]
    pub workers: usize,

    /// Per-upload timeout
    #[arg(long, global = true, default_value = "180s")]
    pub upload_timeout: humantime::Duration,

    /// Credential file (defaults to ~/.logmd_token)
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Upload a PDB file; multi-model files become one frame per model
    Upload {
        file: PathBuf,
        /// Project to upload to (requires login)
        #[arg(long, default_value = "")]
        project: String,
        /// Send every model in one request instead of one frame at a time
        #[arg(long, conflicts_with = "project")]
        single_file: bool,
    },
    /// Upload a file every time its contents change
    Watch {
        file: PathBuf,
        /// How often to check the file
        #[arg(long, default_value = "500ms")]
        poll: humantime::Duration,
    },
    /// Save the token from the login page
    Login {
        /// Token JSON; read from stdin when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// List demo walkthroughs
    Demos,
    /// How to get in touch
    Vchat,
}

/// Treat `logmd file.pdb` as `logmd upload file.pdb`.
pub fn normalize_args(mut args: Vec<String>) -> Vec<String> {
    if let Some(first) = args.get(1) {
        if first.contains('.') && !first.starts_with('-') {
            args.insert(1, "upload".to_string());
        }
    }
    args
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli, project: &str) -> Result<RunConfig> {
    let endpoints = Endpoints::parse(&args.api_url, &args.frontend_url, &args.storage_url)?;
    Ok(RunConfig {
        worker_count: args.workers,
        project: project.to_string(),
        upload_timeout: Duration::from(args.upload_timeout),
        endpoints,
        credentials_path: args.credentials.clone(),
        ..RunConfig::default()
    })
}

pub fn run(args: Cli) -> Result<()> {
    match &args.command {
        Command::Upload {
            file,
            single_file: true,
            ..
        } => upload_single_file(&args, file),
        Command::Upload { file, project, .. } => upload(&args, file, project),
        Command::Watch { file, poll } => watch(&args, file, Duration::from(*poll)),
        Command::Login { token } => login(&args, token.as_deref()),
        Command::Demos => {
            print_demos();
            Ok(())
        }
        Command::Vchat => {
            print_contact();
            Ok(())
        }
    }
}

fn upload(args: &Cli, file: &Path, project: &str) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let mut run = RunController::start(build_config(args, project)?)
        .context("failed to start run")?;
    println!("{}", run.url());

    let models = split_models(&content);
    let many = models.len() > 1;
    for (idx, model) in models.into_iter().enumerate() {
        if many && idx > 0 {
            std::thread::sleep(MODEL_PAUSE);
        }
        run.log(&PdbText(model), None, None)?;
    }
    if many {
        eprintln!("Queued {} models", run.frame_count());
    }

    let summary = run.shutdown()?;
    if summary.failed > 0 {
        eprintln!(
            "{} of {} frame(s) failed to upload",
            summary.failed, summary.attempted
        );
    }
    Ok(())
}

fn upload_single_file(args: &Cli, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let trajectory = trajectory_from_models(&content)?;

    let cfg = build_config(args, "")?;
    let client = RemoteClient::new(cfg.endpoints, cfg.upload_timeout)?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build upload runtime")?;
    let identity = rt
        .block_on(client.upload_trajectory(&trajectory))
        .context("trajectory upload failed")?;
    println!("{}", identity.url);
    Ok(())
}

fn trajectory_from_models(content: &str) -> Result<Trajectory> {
    let mut trajectory = Trajectory::new();
    let header = Annotations::new();
    for model in split_models(content) {
        trajectory.push(&PdbText(model), &header)?;
    }
    Ok(trajectory)
}

fn watch(args: &Cli, file: &Path, poll: Duration) -> Result<()> {
    let stop = ctrl_c_flag()?;
    let mut run = RunController::start(build_config(args, "")?)
        .context("failed to start run")?;
    println!("{}", run.url());

    let mut last_hash = String::new();
    while !stop.load(Ordering::Relaxed) {
        match std::fs::read(file) {
            Ok(bytes) => {
                let hash = hex::encode(Sha256::digest(&bytes));
                if hash != last_hash {
                    eprintln!("found change in {}, uploading...", file.display());
                    last_hash = hash;
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    run.log(&PdbText(text), None, None)?;
                }
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "could not read watched file");
            }
        }
        std::thread::sleep(poll);
    }

    run.shutdown()?;
    Ok(())
}

/// Flag set once Ctrl-C is received, so the caller can drain before exiting.
fn ctrl_c_flag() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop2 = stop.clone();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("failed to build signal runtime")?;
    std::thread::Builder::new()
        .name("logmd-signal".into())
        .spawn(move || {
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop2.store(true, Ordering::Relaxed);
                }
            });
        })
        .context("failed to spawn signal thread")?;
    Ok(stop)
}

fn login(args: &Cli, token: Option<&str>) -> Result<()> {
    let endpoints = Endpoints::parse(&args.api_url, &args.frontend_url, &args.storage_url)?;
    let store = CredentialStore::resolve(args.credentials.as_deref())?;

    let raw = match token {
        Some(t) => t.to_string(),
        None => {
            eprintln!("Login here: {}", endpoints.login_url());
            eprintln!("Enter your token:");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed to read token")?;
            line
        }
    };

    store.login(&raw)?;
    eprintln!("Logged in successfully, token saved to {}", store.path().display());
    Ok(())
}

fn print_demos() {
    let what_width = DEMOS.iter().map(|(w, _, _)| w.len()).max().unwrap_or(0);
    println!("{:<what_width$}  Where", "What");
    for (what, blurb, link) in DEMOS {
        println!("{what:<what_width$}  {blurb}");
        println!("{:<what_width$}  {link}", "");
    }
}

fn print_contact() {
    println!("Get in touch");
    println!();
    println!("Please book a time with us here:");
    println!("  https://calendly.com/alexander-mathiasen/vchat");
    println!();
    println!("Or reach out to us at alexmath@gmail.com");
}
