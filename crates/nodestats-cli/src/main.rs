#![deny(unsafe_code)]

// Use mimalloc for reduced allocation latency (enabled by default).
// Disable with `--no-default-features` if debugging allocator issues.
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod config;
mod exit_code;
mod http;
mod output;
mod state;
mod terminal;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "tokio-console")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nodestats_core::FetchError;

use crate::commands::{Context, completions, summary, watch};
use crate::config::{Config, ConfigError};

/// Live statistics for capture nodes
#[derive(Parser)]
#[command(name = "nodestats")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Print the node summary once
    nodestats summary --sort deltaBytes --desc

    # Live view refreshing every 15 seconds, CPU chart stepping every minute
    nodestats watch --interval 15000 --graph-type cpu --graph-step 60

    # Busiest capture nodes first
    nodestats watch --filter cap --sort deltaBytes --desc

    # Point at another collector
    NODESTATS_URL=http://collector:8005 nodestats summary --format json
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Stats backend URL (overrides base_url from the config file)
    #[arg(long, env = "NODESTATS_URL", global = true)]
    url: Option<String>,

    /// Config file (defaults to config.toml in the config directory)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one page of the node summary
    Summary(summary::SummaryArgs),

    /// Keep the node summary and its charts live
    Watch(watch::WatchArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Held until exit so buffered file logs are flushed.
    let _log_guard = if cli.quiet {
        None
    } else {
        setup_tracing(cli.verbose, cli.log_file.as_deref())?
    };

    if let Commands::Completions(args) = &cli.command {
        return completions::execute(args);
    }

    let config_dir = config::config_dir()?;
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = Context {
        config,
        url: cli.url,
        config_dir,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        match &cli.command {
            Commands::Summary(args) => summary::run(&ctx, args).await,
            Commands::Watch(args) => watch::run(&ctx, args).await,
            Commands::Completions(args) => completions::execute(args),
        }
    })
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    if let Some(path) = log_file {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
            .with_ansi(false)
            .with_writer(writer)
            .init();
        return Ok(Some(guard));
    }

    #[cfg(feature = "tokio-console")]
    {
        use std::net::SocketAddr;
        use tracing_subscriber::Layer;

        let console_port: u16 = std::env::var("TOKIO_CONSOLE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(6669);

        let console_addr: SocketAddr = ([127, 0, 0, 1], console_port).into();
        let port_available = std::net::TcpListener::bind(console_addr).is_ok();

        let fmt_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

        if port_available {
            let console_layer = console_subscriber::ConsoleLayer::builder()
                .server_addr(console_addr)
                .spawn();
            tracing_subscriber::registry()
                .with(console_layer)
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).with_filter(fmt_filter))
                .init();
            tracing::info!("tokio-console enabled, connect with: tokio-console http://127.0.0.1:{}", console_port);
        } else {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).with_filter(fmt_filter))
                .init();
            tracing::warn!(
                "tokio-console port {} already in use, running without console instrumentation.",
                console_port
            );
        }
    }

    #[cfg(not(feature = "tokio-console"))]
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    Ok(None)
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(fetch_err) = cause.downcast_ref::<FetchError>() {
            return match fetch_err {
                FetchError::Transport(_) | FetchError::Timeout(_) => exit_code::BACKEND_UNREACHABLE,
                FetchError::Status { .. } | FetchError::Decode(_) => exit_code::GENERAL_ERROR,
            };
        }

        if cause.downcast_ref::<ConfigError>().is_some() {
            return exit_code::GENERAL_ERROR;
        }
    }

    exit_code::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_unreachable_backend_exit_code() {
        let err = anyhow::Error::new(FetchError::Timeout(Duration::from_secs(1)))
            .context("Failed to load node summary");
        assert_eq!(categorize_error(&err), exit_code::BACKEND_UNREACHABLE);
    }

    #[test]
    fn test_backend_status_is_general_error() {
        let err = anyhow::Error::new(FetchError::Status {
            code: 500,
            message: "boom".to_string(),
        });
        assert_eq!(categorize_error(&err), exit_code::GENERAL_ERROR);
    }
}
