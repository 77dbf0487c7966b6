use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod config;
mod prompt;

use cli::Args;
use config::Config;

/// Initialize tracing:
/// 1. stderr, so stdout stays clean for the report
/// 2. optionally a plain-text log file
///
/// The returned guard must live until exit or buffered file lines are lost.
fn initialize_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,vmreaper=info,vmreaper_orchestrations=info".into());

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .with_context(|| format!("--log-file {} does not name a file", path.display()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(file_writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _guard = initialize_tracing(args.log_file.as_deref())?;

    let config = Config::load(args)?;
    commands::destroy::run(&config).await
}
