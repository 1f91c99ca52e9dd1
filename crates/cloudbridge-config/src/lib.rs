//! Configuration system for cloudbridge.
//!
//! Provides TOML-based configuration with:
//! - Remote asset locations (`[assets]`): the precompiled guest module and
//!   the static files (fonts) staged into the sandbox
//! - Guest runtime settings (`[sandbox]`): interpreter module, mounts,
//!   packages, execution bounds
//! - The fixed render bundle (`[render]`) handed to the guest program
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, Layer, LayerStatus, LoadedConfig, PROJECT_CONFIG_FILE, load_config,
    load_config_file, load_config_with_options, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
