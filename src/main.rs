mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// Not `#[tokio::main]`: the run controller owns its own runtime and is
// driven synchronously, like a simulation loop would.
fn main() -> Result<()> {
    init_tracing();
    let args = cli::Cli::parse_from(cli::normalize_args(std::env::args().collect()));
    cli::run(args)
}
