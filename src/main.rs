mod cli;
mod error;
mod model;
mod orchestrator;
mod registry;
mod routines;
mod selector;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;
mod views;

use anyhow::Result;
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(to_file: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    if !to_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
        return;
    }

    let log_path = dirs::data_local_dir().map(|d| d.join("auton-selector").join("selector.log"));
    let file = log_path.as_ref().and_then(|p| {
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }
        OpenOptions::new().create(true).append(true).open(p).ok()
    });

    match (log_path, file) {
        (Some(path), Some(file)) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .init();
            tracing::info!(path = %path.display(), "logging initialized");
        }
        // Without a log file, drop logs rather than draw over the TUI.
        _ => tracing_subscriber::registry().with(env_filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_tui = cfg!(feature = "tui") && !args.is_headless();
    init_tracing(is_tui);

    cli::run(args).await
}
