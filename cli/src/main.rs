//! todo - command-line client for the todo API.

use clap::Parser;
use todo_core::{ApiClientError, ErrorKind, ValidationError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod output;
mod transport;

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Tracing is opt-in via RUST_LOG and goes to stderr.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new("off"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    if let Err(err) = cli.run().await {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ValidationError>().is_some() {
        return 2;
    }
    match err.downcast_ref::<ApiClientError>().map(ApiClientError::kind) {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::Transport) => 4,
        _ => 1,
    }
}
