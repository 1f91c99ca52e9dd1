//! The guest runtime trait.

use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{SandboxError, SandboxResult};

/// Output of a guest program that completed successfully.
#[derive(Debug, Clone, Default)]
pub struct GuestOutput {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr (warnings the guest printed without failing).
    pub stderr: String,
    /// Wall-clock execution time.
    pub elapsed: Duration,
}

/// An embedded interpreter sandbox with a private filesystem.
///
/// All operations may suspend. Implementations must be safe to share behind
/// an `Arc`; the bridge serializes executions itself.
#[async_trait]
pub trait GuestRuntime: Send + Sync {
    /// Human-readable runtime name, used in logs.
    fn name(&self) -> &str;

    /// Start the runtime. Calling it again after success is a no-op.
    async fn boot(&self) -> SandboxResult<()>;

    /// Whether `boot()` has completed.
    fn is_booted(&self) -> bool;

    /// Make a package importable by guest programs.
    ///
    /// Cheap when the package is already loaded.
    async fn load_package(&self, name: &str) -> SandboxResult<()>;

    /// Names of packages loaded so far.
    fn loaded_packages(&self) -> Vec<String>;

    /// Execute a guest program.
    ///
    /// A program that raises or exits non-zero yields
    /// [`SandboxError::GuestFault`] carrying the guest's diagnostic.
    async fn run(&self, source: &str) -> SandboxResult<GuestOutput>;

    /// Write raw bytes to `name` in the private filesystem.
    async fn write_file(&self, name: &str, bytes: &[u8]) -> SandboxResult<()>;

    /// Read `name` from the private filesystem as raw bytes.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    async fn read_file(&self, name: &str) -> SandboxResult<Option<Vec<u8>>>;

    /// Delete `name` from the private filesystem. Absent files are not an error.
    async fn remove_file(&self, name: &str) -> SandboxResult<()>;
}

/// A runtime that can be shared across tasks.
pub type SharedRuntime = Arc<dyn GuestRuntime>;

/// Reject names that are not a single plain path component.
pub fn validate_file_name(name: &str) -> SandboxResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(SandboxError::InvalidFileName(name.to_string())),
    }
}
