//! Check command - provision the sandbox without rendering.

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use indicatif::{ProgressBar, ProgressStyle};

use super::Context;
use crate::session;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Also load every configured package
    #[arg(long)]
    pub packages: bool,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    ctx.config.validate()?;
    let sandbox = ctx.config.sandbox();
    let runtime = session::build_runtime(&sandbox)?;

    let mut provisioner = session::build_provisioner(&ctx.config, runtime.clone())?;
    if args.packages {
        provisioner = provisioner.with_preload(sandbox.packages.clone());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    spinner.set_message(format!("Provisioning {} sandbox...", runtime.name()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    let result = provisioner.initialize().await;
    spinner.finish_and_clear();
    let provisioned = result?;
    let elapsed = started.elapsed();

    if ctx.json_output {
        let staged: Vec<_> = provisioned
            .staged()
            .iter()
            .map(|asset| {
                serde_json::json!({
                    "target": asset.target,
                    "bytes": asset.bytes,
                    "sha256": asset.sha256,
                })
            })
            .collect();
        let report = serde_json::json!({
            "runtime": runtime.name(),
            "staged": staged,
            "packages": provisioned.preloaded(),
            "elapsed_ms": elapsed.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!(
        "{} Sandbox ready ({}, {:.1}s)",
        style("✓").green(),
        runtime.name(),
        elapsed.as_secs_f64()
    );
    for asset in provisioned.staged() {
        println!(
            "  {:<28} {:>10} bytes  {}",
            asset.target,
            asset.bytes,
            dim.apply_to(&asset.sha256[..16])
        );
    }
    if !provisioned.preloaded().is_empty() {
        println!("  packages: {}", provisioned.preloaded().join(", "));
    }

    Ok(())
}
