//! cloudbridge - word clouds rendered inside an embedded interpreter sandbox
//!
//! Main entry point for the cloudbridge CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cloudbridge_config::LoggingSection;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

mod commands;
mod display;
mod session;

use commands::{check, config, render, repl};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// cloudbridge - render word clouds inside an embedded interpreter sandbox
#[derive(Parser)]
#[command(name = "cloudbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Load this config file instead of discovering config layers
    #[arg(long, global = true, env = "CLOUDBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render text into a word cloud once
    Render(render::RenderArgs),

    /// Interactive session: every line re-renders against one sandbox
    Repl(repl::ReplArgs),

    /// Provision the sandbox and report what was staged
    Check(check::CheckArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = commands::Context::load(cli.config.as_deref(), cli.json, cli.verbose)?;
    let _guard = init_tracing(cli.verbose, &ctx.config.logging());

    for warning in &ctx.warnings {
        warn!("{}", warning);
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Render(args) => render::run(args, &ctx).await,
        Commands::Repl(args) => repl::run(args, &ctx).await,
        Commands::Check(args) => check::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

/// Console (human-readable, stderr) + daily-rotated JSON file.
fn init_tracing(verbose: bool, logging: &LoggingSection) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let filter = if verbose {
        "cloudbridge=debug,cloudbridge_core=debug,cloudbridge_sandbox=debug,cloudbridge_config=debug,info"
    } else {
        "cloudbridge=info,cloudbridge_core=info,cloudbridge_sandbox=info,warn"
    };

    let mut appender_error = None;
    let (file_layer, guard) = if logging.file {
        let log_dir = logging
            .dir
            .clone()
            .or_else(|| cloudbridge_config::xdg_config_dir().map(|d| d.join("logs")))
            .unwrap_or_else(|| PathBuf::from("logs"));

        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("cloudbridge")
            .filename_suffix("log")
            .build(&log_dir)
        {
            Ok(appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_filter(tracing_subscriber::EnvFilter::new(
                        "cloudbridge=trace,cloudbridge_core=trace,cloudbridge_sandbox=trace,cloudbridge_config=trace,info",
                    ));
                (Some(layer), Some(guard))
            }
            Err(e) => {
                appender_error = Some(format!("File logging disabled ({}): {e}", log_dir.display()));
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_layer)
        .init();

    if let Some(message) = appender_error {
        warn!("{}", message);
    }

    guard
}
