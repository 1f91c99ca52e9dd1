//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use cloudbridge_config::{CloudbridgeConfig, PROJECT_CONFIG_FILE};
use console::style;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration and where it came from
    Show,

    /// Show the user configuration file path
    Path,

    /// Check the effective configuration for errors
    Validate,

    /// Write a config file populated with defaults
    Init {
        /// Create project-local config (./cloudbridge.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(),
        ConfigCommand::Validate => cmd_validate(ctx),
        ConfigCommand::Init { local, force } => cmd_init(local, force),
    }
}

/// The config with every section filled in.
fn effective(config: &CloudbridgeConfig) -> CloudbridgeConfig {
    CloudbridgeConfig {
        assets: Some(config.assets()),
        sandbox: Some(config.sandbox()),
        render: Some(config.render()),
        logging: Some(config.logging()),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let toml_str = effective(&ctx.config).to_toml()?;

    if ctx.json_output {
        let report = serde_json::json!({
            "sources": ctx.loaded_from.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "warnings": ctx.warnings,
            "config": toml_str,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("# cloudbridge configuration\n");

    if ctx.loaded_from.is_empty() {
        println!("# No config files loaded (using defaults)\n");
    } else {
        println!("# Config files (later overrides earlier):");
        for source in &ctx.loaded_from {
            println!("#   {}", source.display());
        }
        println!();
    }

    for warning in &ctx.warnings {
        println!("# ⚠ {warning}");
    }

    println!("{toml_str}");
    Ok(())
}

fn cmd_path() -> Result<()> {
    match cloudbridge_config::xdg_config_path() {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => bail!("Could not determine the config directory"),
    }
}

fn cmd_validate(ctx: &Context) -> Result<()> {
    ctx.config.validate()?;
    if ctx.config.sandbox().interpreter.is_none() {
        println!(
            "{} Configuration is valid, but no interpreter is set ([sandbox].interpreter)",
            style("!").yellow()
        );
    } else {
        println!("{} Configuration is valid", style("✓").green());
    }
    Ok(())
}

fn cmd_init(local: bool, force: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(PROJECT_CONFIG_FILE)
    } else {
        match cloudbridge_config::xdg_config_path() {
            Some(path) => path,
            None => bail!("Could not determine the config directory"),
        }
    };

    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    cloudbridge_config::save_config(&effective(&CloudbridgeConfig::new()), &path)?;
    println!("{} Wrote {}", style("✓").green(), path.display());
    Ok(())
}
