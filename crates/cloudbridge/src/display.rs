//! Display surfaces for the terminal.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cloudbridge_core::{DataUri, DisplayError, DisplaySurface};
use tracing::debug;

/// Decodes each image and overwrites a PNG file.
#[derive(Debug, Clone)]
pub struct FileDisplay {
    path: PathBuf,
}

impl FileDisplay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DisplaySurface for FileDisplay {
    async fn show(&self, image: &DataUri) -> Result<(), DisplayError> {
        let bytes = image
            .to_bytes()
            .map_err(|e| DisplayError(format!("Image is not valid base64: {e}")))?;
        tokio::fs::write(&self.path, &bytes)
            .await
            .map_err(|e| DisplayError(format!("Failed to write {}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Wrote image");
        Ok(())
    }
}

/// Prints the data URI on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutDisplay;

#[async_trait]
impl DisplaySurface for StdoutDisplay {
    async fn show(&self, image: &DataUri) -> Result<(), DisplayError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{image}")
            .and_then(|()| stdout.flush())
            .map_err(|e| DisplayError(format!("Failed to write to stdout: {e}")))
    }
}
