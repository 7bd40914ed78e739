use crate::config::RenderConfig;
use crate::error::Result;
use crate::types::{Frame, PixelLayout};
use std::sync::Arc;

/// A finished composite, already scaled and in the surface's native layout.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub image: Frame,
    /// Top-left corner of `image` on the surface (centering margins).
    pub offset_x: u32,
    pub offset_y: u32,
    pub sequence: u64,
}

/// Where composites end up.
pub trait DisplaySurface: Send + Sync {
    /// Currently available drawing area; `(0, 0)` means unknown.
    fn size(&self) -> (u32, u32);

    fn layout(&self) -> PixelLayout;

    /// Replace the shown frame. The previous frame stays alive until this call swaps it out.
    fn present(&self, frame: Arc<DisplayFrame>) -> Result<()>;
}

/// Factory function to create the display surface from render settings
pub fn create_display_surface(config: &RenderConfig) -> Arc<dyn DisplaySurface> {
    let memory = super::memory::MemorySurface::new(
        config.display_width,
        config.display_height,
        PixelLayout::Rgba8,
    );

    match &config.snapshot_path {
        Some(path) => Arc::new(super::snapshot::SnapshotSurface::new(
            memory,
            path.clone(),
            std::time::Duration::from_millis(config.snapshot_interval_ms),
        )),
        None => Arc::new(memory),
    }
}
