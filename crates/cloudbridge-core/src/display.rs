//! Where rendered images go.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::DisplayError;
use crate::transport::DataUri;

/// An image-displaying surface.
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Replace whatever is shown with `image`.
    async fn show(&self, image: &DataUri) -> Result<(), DisplayError>;
}

pub type SharedDisplay = Arc<dyn DisplaySurface>;

/// Keeps the most recent image in memory.
#[derive(Debug, Default)]
pub struct MemoryDisplay {
    current: Mutex<Option<DataUri>>,
    updates: Mutex<usize>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<DataUri> {
        self.current.lock().clone()
    }

    /// Number of successful `show` calls.
    pub fn updates(&self) -> usize {
        *self.updates.lock()
    }
}

#[async_trait]
impl DisplaySurface for MemoryDisplay {
    async fn show(&self, image: &DataUri) -> Result<(), DisplayError> {
        *self.current.lock() = Some(image.clone());
        *self.updates.lock() += 1;
        Ok(())
    }
}
