//! Error types for guest runtime operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving a guest runtime.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// An operation needed the runtime before `boot()` completed.
    #[error("Guest runtime has not been booted")]
    NotBooted,

    /// The runtime could not be started.
    #[error("Failed to boot guest runtime: {0}")]
    BootFailed(String),

    /// A requested package is not available to the runtime.
    #[error("Package '{name}' not found{}", .searched.as_ref().map(|p| format!(" in {p}")).unwrap_or_default())]
    PackageNotFound {
        name: String,
        searched: Option<String>,
    },

    /// The guest program raised or exited non-zero.
    #[error("Guest program failed{}: {message}", .exit_code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
    GuestFault {
        exit_code: Option<i32>,
        message: String,
    },

    /// The guest exhausted its execution budget.
    #[error("Guest execution timed out after {0:?}")]
    Timeout(Duration),

    /// A file name would escape the private filesystem.
    #[error("Invalid file name '{0}': must be a single plain path component")]
    InvalidFileName(String),

    /// Host-side failure while preparing or running the guest.
    #[error("Guest execution failed: {0}")]
    ExecutionFailed(String),

    /// IO error on the private filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Whether this error was raised by the guest program itself.
    pub fn is_guest_fault(&self) -> bool {
        matches!(self, SandboxError::GuestFault { .. })
    }
}

/// Result type for guest runtime operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
