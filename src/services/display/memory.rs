use super::r#trait::{DisplayFrame, DisplaySurface};
use crate::error::Result;
use crate::types::PixelLayout;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Keeps the latest composite in memory for whoever presents it.
pub struct MemorySurface {
    size: RwLock<(u32, u32)>,
    layout: PixelLayout,
    current: RwLock<Option<Arc<DisplayFrame>>>,
    presents: AtomicU64,
}

impl MemorySurface {
    pub fn new(width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            size: RwLock::new((width, height)),
            layout,
            current: RwLock::new(None),
            presents: AtomicU64::new(0),
        }
    }

    /// The displaying side reports a new drawing area.
    pub fn set_size(&self, width: u32, height: u32) {
        *self.size.write() = (width, height);
    }

    pub fn current(&self) -> Option<Arc<DisplayFrame>> {
        self.current.read().clone()
    }

    pub fn presents(&self) -> u64 {
        self.presents.load(Ordering::Relaxed)
    }
}

impl DisplaySurface for MemorySurface {
    fn size(&self) -> (u32, u32) {
        *self.size.read()
    }

    fn layout(&self) -> PixelLayout {
        self.layout
    }

    fn present(&self, frame: Arc<DisplayFrame>) -> Result<()> {
        let previous = self.current.write().replace(frame);
        // old frame released only after the new one is visible
        drop(previous);
        self.presents.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frame;

    fn display_frame(sequence: u64) -> Arc<DisplayFrame> {
        Arc::new(DisplayFrame {
            image: Frame::new(1, 1, PixelLayout::Rgba8, vec![0, 0, 0, 255]).unwrap(),
            offset_x: 0,
            offset_y: 0,
            sequence,
        })
    }

    #[test]
    fn present_replaces_current_frame() {
        let surface = MemorySurface::new(1200, 400, PixelLayout::Rgba8);
        assert!(surface.current().is_none());

        let first = display_frame(1);
        surface.present(Arc::clone(&first)).unwrap();
        assert_eq!(Arc::strong_count(&first), 2);

        surface.present(display_frame(2)).unwrap();
        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(surface.current().unwrap().sequence, 2);
        assert_eq!(surface.presents(), 2);
    }

    #[test]
    fn size_can_change() {
        let surface = MemorySurface::new(1200, 400, PixelLayout::Bgra8);
        surface.set_size(640, 480);
        assert_eq!(surface.size(), (640, 480));
        assert_eq!(surface.layout(), PixelLayout::Bgra8);
    }
}
