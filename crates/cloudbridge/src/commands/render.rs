//! Render command - one-shot word cloud.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use cloudbridge_core::{RunOutcome, SharedDisplay};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::Context;
use crate::display::{FileDisplay, StdoutDisplay};
use crate::session;

/// Arguments for the render command.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Text to render (reads stdin if neither this nor --file is given)
    pub text: Option<String>,

    /// Read the text from a file
    #[arg(short, long, conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Write the PNG to this path instead of printing a data URI
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print the generated guest program and exit without running it
    #[arg(long)]
    pub print_program: bool,
}

/// Run the render command.
pub async fn run(args: RenderArgs, ctx: &Context) -> Result<()> {
    let text = read_input(&args)?;
    if text.trim().is_empty() {
        bail!("Nothing to render: input is empty");
    }

    if args.print_program {
        print!("{}", session::synthesizer(&ctx.config).synthesize(&text));
        return Ok(());
    }

    let display: SharedDisplay = match &args.out {
        Some(path) => Arc::new(FileDisplay::new(path)),
        None => Arc::new(StdoutDisplay),
    };
    let host = session::launch(&ctx.config, display)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    spinner.set_message("Provisioning sandbox and rendering...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = host.run(&text).await;
    spinner.finish_and_clear();

    match result? {
        RunOutcome::Rendered(image) => {
            if ctx.json_output {
                let summary = serde_json::json!({
                    "rendered": true,
                    "bytes": image.to_bytes()?.len(),
                    "out": args.out.as_ref().map(|p| p.display().to_string()),
                });
                eprintln!("{summary}");
            } else if let Some(path) = &args.out {
                eprintln!("{} Wrote {}", style("✓").green(), path.display());
            }
            Ok(())
        }
        other => bail!("Render did not run: {other:?}"),
    }
}

fn read_input(args: &RenderArgs) -> Result<String> {
    if let Some(text) = &args.text {
        return Ok(text.clone());
    }
    if let Some(path) = &args.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read stdin")?;
    Ok(text)
}
