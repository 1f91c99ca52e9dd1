//! CLI command handlers.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use cloudbridge_config::CloudbridgeConfig;

pub mod check;
pub mod config;
pub mod render;
pub mod repl;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// The effective configuration.
    pub config: CloudbridgeConfig,
    /// Files the configuration was read from, lowest precedence first.
    pub loaded_from: Vec<PathBuf>,
    /// Non-fatal problems found while loading.
    pub warnings: Vec<String>,
    /// Set when `--config` bypassed discovery.
    pub explicit_config: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load config from `explicit` or by layered discovery.
    pub fn load(explicit: Option<&Path>, json_output: bool, verbose: bool) -> Result<Self> {
        let (config, loaded_from, warnings) = match explicit {
            Some(path) => {
                let config = cloudbridge_config::load_config_file(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?;
                (config, vec![path.to_path_buf()], Vec::new())
            }
            None => {
                let loaded = cloudbridge_config::load_config(None)?;
                let loaded_from = loaded
                    .loaded_from()
                    .into_iter()
                    .map(Path::to_path_buf)
                    .collect();
                let warnings = loaded.warnings();
                (loaded.config, loaded_from, warnings)
            }
        };

        Ok(Self {
            config,
            loaded_from,
            warnings,
            explicit_config: explicit.map(Path::to_path_buf),
            json_output,
            verbose,
        })
    }
}
