//! Configuration error types.

use std::path::PathBuf;

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading, saving or validating a bridge config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An entry is present but a required field is blank.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// A field holds a value the bridge cannot work with.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
