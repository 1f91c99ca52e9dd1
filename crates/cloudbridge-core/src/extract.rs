//! Artifact retrieval from the guest's private filesystem.

use cloudbridge_sandbox::{SandboxError, SharedRuntime};
use tracing::debug;

use crate::error::ExtractionError;
use crate::transport::{DataUri, is_png};

/// Reads the rendered PNG the guest wrote and wraps it as a data URI.
///
/// The file is read as raw bytes. Stdout is never used for image data.
#[derive(Clone)]
pub struct ResultExtractor {
    runtime: SharedRuntime,
    file: String,
}

impl ResultExtractor {
    pub fn new(runtime: SharedRuntime, file: impl Into<String>) -> Self {
        Self {
            runtime,
            file: file.into(),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Remove any artifact left by an earlier run.
    pub async fn clear(&self) -> Result<(), SandboxError> {
        self.runtime.remove_file(&self.file).await
    }

    pub async fn extract(&self) -> Result<DataUri, ExtractionError> {
        let bytes = self
            .runtime
            .read_file(&self.file)
            .await
            .map_err(|source| ExtractionError::Sandbox {
                file: self.file.clone(),
                source,
            })?
            .ok_or_else(|| ExtractionError::Missing {
                file: self.file.clone(),
            })?;

        if !is_png(&bytes) {
            return Err(ExtractionError::NotPng {
                file: self.file.clone(),
            });
        }

        debug!(file = %self.file, bytes = bytes.len(), "Extracted artifact");
        Ok(DataUri::png(&bytes))
    }
}

impl std::fmt::Debug for ResultExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultExtractor")
            .field("runtime", &self.runtime.name())
            .field("file", &self.file)
            .finish()
    }
}
