//! Locating and layering bridge config files.
//!
//! Two layers are read, the later one replacing whole sections of the earlier:
//! 1. the user file, `$CLOUDBRIDGE_CONFIG_DIR/config.toml` or the platform
//!    config dir (`~/.config/cloudbridge/config.toml` on Linux)
//! 2. the project file, `./cloudbridge.toml`
//!
//! `--config` on the command line skips discovery entirely.

use std::path::{Path, PathBuf};

use crate::{CloudbridgeConfig, ConfigError, Result};

/// File name of the project-local layer.
pub const PROJECT_CONFIG_FILE: &str = "cloudbridge.toml";

const USER_CONFIG_FILE: &str = "config.toml";
const APP_DIR: &str = "cloudbridge";
const CONFIG_DIR_ENV: &str = "CLOUDBRIDGE_CONFIG_DIR";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Project,
}

impl Layer {
    pub fn label(self) -> &'static str {
        match self {
            Layer::User => "user",
            Layer::Project => "project",
        }
    }
}

/// What happened when a layer's file was looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    /// Parsed and merged.
    Loaded,
    /// No file at the path.
    Absent,
    /// The file exists but could not be used; the layer was skipped.
    Rejected(String),
}

/// One layer of the discovery walk.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: Layer,
    pub path: PathBuf,
    pub status: LayerStatus,
}

/// The merged config plus a record of every layer consulted.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: CloudbridgeConfig,
    /// Lowest precedence first.
    pub sources: Vec<ConfigSource>,
}

impl LoadedConfig {
    /// Paths of the layers that contributed to `config`.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.status == LayerStatus::Loaded)
            .map(|s| s.path.as_path())
            .collect()
    }

    /// One message per rejected layer.
    pub fn warnings(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter_map(|s| match &s.status {
                LayerStatus::Rejected(reason) => Some(format!(
                    "Ignored {} config {}: {reason}",
                    s.layer.label(),
                    s.path.display()
                )),
                _ => None,
            })
            .collect()
    }
}

/// Discover and merge the user and project layers.
///
/// `project_dir` defaults to the current directory.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with the user config directory pinned.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    let project = match project_dir {
        Some(dir) => dir.join(PROJECT_CONFIG_FILE),
        None => PathBuf::from(PROJECT_CONFIG_FILE),
    };

    let layers = user
        .map(|path| (Layer::User, path))
        .into_iter()
        .chain(std::iter::once((Layer::Project, project)));

    let mut config = CloudbridgeConfig::new();
    let mut sources = Vec::new();
    for (layer, path) in layers {
        let status = if !path.is_file() {
            LayerStatus::Absent
        } else {
            match load_config_file(&path) {
                Ok(found) => {
                    config.merge(found);
                    LayerStatus::Loaded
                }
                Err(e) => {
                    tracing::warn!(layer = layer.label(), path = %path.display(), error = %e, "skipping config layer");
                    LayerStatus::Rejected(e.to_string())
                }
            }
        };
        sources.push(ConfigSource {
            layer,
            path,
            status,
        });
    }

    Ok(LoadedConfig { config, sources })
}

/// Read one config file without any layering.
pub fn load_config_file(path: &Path) -> Result<CloudbridgeConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    CloudbridgeConfig::from_toml(&contents)
}

/// Write `config` to `path`, creating missing parent directories.
pub fn save_config(config: &CloudbridgeConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err(parent))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(write_err(path))
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError {
    let path = path.to_path_buf();
    move |source| ConfigError::Write { path, source }
}

/// Path of the user layer, if a config directory can be determined.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// The user config directory. `CLOUDBRIDGE_CONFIG_DIR` wins when set.
pub fn xdg_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(APP_DIR)),
    }
}
