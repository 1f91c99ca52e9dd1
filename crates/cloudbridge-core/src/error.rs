//! Error types for the execution bridge.
//!
//! Provisioning failures are fatal to a session. Per-request failures
//! (execution, extraction, display) leave the session usable.

use std::time::Duration;

use cloudbridge_sandbox::SandboxError;
use thiserror::Error;

/// Failure retrieving a remote asset.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The asset location could not be turned into a URL.
    #[error("Invalid asset URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Transport failure or timeout.
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Local (`file://`) asset could not be read.
    #[error("Failed to read {path}: {source}")]
    Local {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Scheme the fetcher does not speak.
    #[error("Unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),
}

/// Failure while provisioning the sandbox. Fatal to the session.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Failed to boot guest runtime: {0}")]
    Boot(#[source] SandboxError),

    #[error("Failed to fetch asset '{target}': {source}")]
    Fetch {
        target: String,
        #[source]
        source: FetchError,
    },

    #[error("Asset '{target}' is not valid base64: {source}")]
    Decode {
        target: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Failed to stage asset '{target}': {source}")]
    Stage {
        target: String,
        #[source]
        source: SandboxError,
    },

    #[error("Failed to preload package '{name}': {source}")]
    Package {
        name: String,
        #[source]
        source: SandboxError,
    },

    #[error("Provisioning timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure running one request's guest program. The session stays usable.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Failed to load package '{name}': {source}")]
    Package {
        name: String,
        #[source]
        source: SandboxError,
    },

    /// The guest program raised; `message` is its diagnostic.
    #[error("Guest program raised: {message}")]
    GuestFault { message: String },

    #[error("Guest execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sandbox error: {0}")]
    Sandbox(#[source] SandboxError),
}

impl From<SandboxError> for ExecutionError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::GuestFault { message, .. } => ExecutionError::GuestFault { message },
            SandboxError::Timeout(limit) => ExecutionError::Timeout(limit),
            other => ExecutionError::Sandbox(other),
        }
    }
}

/// The guest reported success but its artifact is unusable.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Expected output '{file}' was not produced by the guest program")]
    Missing { file: String },

    #[error("Output '{file}' is not a PNG image")]
    NotPng { file: String },

    #[error("Failed to read output '{file}': {source}")]
    Sandbox {
        file: String,
        #[source]
        source: SandboxError,
    },
}

/// A display surface rejected an update.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DisplayError(pub String);

/// Everything a single trigger can fail with.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Display update failed: {0}")]
    Display(#[from] DisplayError),

    /// Provisioning failed; the feature is disabled for this session.
    #[error("Word cloud is unavailable: {0}")]
    Unavailable(String),
}
