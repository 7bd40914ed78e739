use crate::error::Result;
use crate::types::{Frame, Rect};
use std::sync::Arc;

/// An acquired capture handle. Dropping it releases the underlying resource.
pub trait CaptureSource: Send {
    /// Grab the current pixels of `rect` (absolute screen coordinates). Blocking.
    fn grab(&mut self, rect: &Rect) -> Result<Frame>;
}

/// Hands out capture handles; each worker and the renderer open their own.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self) -> Result<Box<dyn CaptureSource>>;
}

/// Factory function to create the capture backend for the run mode
pub fn create_capture_backend(dry_run: bool) -> Result<Arc<dyn CaptureBackend>> {
    if dry_run {
        return Ok(Arc::new(super::dry_run::DryRunCapture::new()));
    }

    #[cfg(feature = "screen-capture")]
    {
        Ok(Arc::new(super::screen::ScreenCapture::new()))
    }

    #[cfg(not(feature = "screen-capture"))]
    {
        Err(crate::error::ScopeError::ServiceUnavailable(
            "built without the `screen-capture` feature; use --dry-run".to_string(),
        ))
    }
}
