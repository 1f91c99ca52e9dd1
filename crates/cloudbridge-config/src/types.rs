//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [assets]                 # where the guest module and fonts come from
//! [[assets.static]]        # one entry per static file staged into the sandbox
//! [sandbox]                # guest interpreter, mounts, packages, bounds
//! [render]                 # fixed settings passed to the word-cloud manager
//! [logging]                # file logging
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged. Accessors fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudbridgeConfig {
    /// Remote assets staged during provisioning.
    pub assets: Option<AssetsSection>,

    /// Guest runtime configuration.
    pub sandbox: Option<SandboxSection>,

    /// Render settings bundle.
    pub render: Option<RenderSection>,

    /// Logging configuration.
    pub logging: Option<LoggingSection>,
}

impl CloudbridgeConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced wholesale, not field by field.
    pub fn merge(&mut self, other: CloudbridgeConfig) {
        if other.assets.is_some() {
            self.assets = other.assets;
        }
        if other.sandbox.is_some() {
            self.sandbox = other.sandbox;
        }
        if other.render.is_some() {
            self.render = other.render;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Asset section, or defaults.
    pub fn assets(&self) -> AssetsSection {
        self.assets.clone().unwrap_or_default()
    }

    /// Sandbox section, or defaults.
    pub fn sandbox(&self) -> SandboxSection {
        self.sandbox.clone().unwrap_or_default()
    }

    /// Render section, or defaults.
    pub fn render(&self) -> RenderSection {
        self.render.clone().unwrap_or_default()
    }

    /// Logging section, or defaults.
    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }

    /// Check that the file names shared between staging and the guest
    /// program line up, and that the render bundle is usable.
    pub fn validate(&self) -> Result<()> {
        let assets = self.assets();
        let sandbox = self.sandbox();
        let render = self.render();

        let mut targets = HashSet::new();
        for entry in std::iter::once(&assets.module).chain(assets.static_files.iter()) {
            check_file_name("assets.target", &entry.target)?;
            if entry.url.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "url".to_string(),
                    context: format!("asset '{}'", entry.target),
                });
            }
            if !targets.insert(entry.target.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "assets.target".to_string(),
                    reason: format!("'{}' is staged more than once", entry.target),
                });
            }
        }

        check_file_name("render.output", &render.output)?;
        if !render.output.ends_with(".png") {
            return Err(ConfigError::InvalidValue {
                field: "render.output".to_string(),
                reason: format!("'{}' must be a .png file", render.output),
            });
        }
        if targets.contains(render.output.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "render.output".to_string(),
                reason: format!("'{}' collides with a staged asset", render.output),
            });
        }

        if !assets.static_files.iter().any(|a| a.target == render.font) {
            return Err(ConfigError::InvalidValue {
                field: "render.font".to_string(),
                reason: format!("'{}' is not staged by any [[assets.static]] entry", render.font),
            });
        }

        if render.max_words == 0 {
            return Err(ConfigError::InvalidValue {
                field: "render.max_words".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if !sandbox.workdir.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "sandbox.workdir".to_string(),
                reason: format!("'{}' must be an absolute guest path", sandbox.workdir),
            });
        }

        Ok(())
    }
}

/// Staged names must be a single plain file name inside the guest workdir.
fn check_file_name(field: &str, name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{name}' must be a plain file name"),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Assets
// ─────────────────────────────────────────────────────────────────────────────

/// A remote resource and the file name it is staged under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Absolute URL, or a path relative to `assets.base_url`.
    pub url: String,
    /// File name inside the sandbox's private filesystem.
    pub target: String,
}

impl AssetEntry {
    pub fn new(url: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target: target.into(),
        }
    }
}

/// Asset configuration.
///
/// ```toml
/// [assets]
/// base_url = "https://example.com/wordcloud/"
/// module = { url = "engine/cloud", target = "cloud.pyc" }
/// fetch_timeout_secs = 30
///
/// [[assets.static]]
/// url = "PretendardVariable.ttf"
/// target = "PretendardVariable.ttf"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsSection {
    /// Base URL relative asset URLs are resolved against.
    pub base_url: Option<String>,
    /// The precompiled library module.
    pub module: AssetEntry,
    /// Static files (fonts) the guest program expects next to the module.
    #[serde(rename = "static")]
    pub static_files: Vec<AssetEntry>,
    /// Per-request HTTP timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// Upper bound for the whole provisioning sequence in seconds.
    pub provision_timeout_secs: u64,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            base_url: None,
            module: AssetEntry::new("engine/cloud", "cloud.pyc"),
            static_files: vec![AssetEntry::new(
                "PretendardVariable.ttf",
                "PretendardVariable.ttf",
            )],
            fetch_timeout_secs: 30,
            provision_timeout_secs: 300,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sandbox
// ─────────────────────────────────────────────────────────────────────────────

/// A host directory exposed read-only to the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    /// Host directory.
    pub host: PathBuf,
    /// Path the guest sees it under.
    pub guest: String,
}

/// Guest runtime configuration.
///
/// ```toml
/// [sandbox]
/// interpreter = "/opt/python-wasi/python.wasm"
/// package_dir = "/opt/python-wasi/packages"
/// packages = ["numpy", "pillow", "wordcloud"]
/// execution_timeout_secs = 120
///
/// [[sandbox.mounts]]
/// host = "/opt/python-wasi/lib"
/// guest = "/usr/local/lib"
///
/// [sandbox.env]
/// PYTHONHOME = "/usr/local"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Path to the interpreter `.wasm` module (WASI preview 1 command).
    pub interpreter: Option<PathBuf>,
    /// `argv[0]` passed to the interpreter.
    pub program_name: String,
    /// Remaining interpreter arguments. The program arrives on stdin.
    pub args: Vec<String>,
    /// Guest path the private filesystem is mounted at.
    pub workdir: String,
    /// Host directory holding one sub-directory per installable package.
    pub package_dir: Option<PathBuf>,
    /// Packages ensured before every execution.
    pub packages: Vec<String>,
    /// Load `packages` during provisioning instead of on first run.
    pub preload_packages: bool,
    /// Environment variable receiving the loaded package paths.
    pub package_path_env: String,
    /// Extra read-only mounts (interpreter stdlib, etc.).
    pub mounts: Vec<MountEntry>,
    /// Extra environment variables for the guest.
    pub env: BTreeMap<String, String>,
    /// Upper bound for one guest execution in seconds.
    pub execution_timeout_secs: u64,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            interpreter: None,
            program_name: "python".to_string(),
            args: vec!["-".to_string()],
            workdir: "/work".to_string(),
            package_dir: None,
            packages: ["micropip", "numpy", "pillow", "wordcloud"]
                .into_iter()
                .map(String::from)
                .collect(),
            preload_packages: false,
            package_path_env: "PYTHONPATH".to_string(),
            mounts: Vec::new(),
            env: BTreeMap::new(),
            execution_timeout_secs: 120,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Render
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed render bundle passed to the guest's manager object.
///
/// ```toml
/// [render]
/// background_color = "white"
/// font = "PretendardVariable.ttf"
/// stopwords = ["the", "a"]
/// max_words = 100
/// output = "result.png"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSection {
    pub background_color: String,
    /// Font file name; must match a staged static asset.
    pub font: String,
    pub stopwords: Vec<String>,
    pub max_words: u32,
    /// Artifact file name the guest writes and the extractor reads.
    pub output: String,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            background_color: "white".to_string(),
            font: "PretendardVariable.ttf".to_string(),
            stopwords: Vec::new(),
            max_words: 100,
            output: "result.png".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// File logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Write a rotating JSON log file.
    pub file: bool,
    /// Log directory. Defaults to `<config dir>/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            file: true,
            dir: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
