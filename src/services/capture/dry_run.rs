use super::r#trait::{CaptureBackend, CaptureSource};
use crate::error::Result;
use crate::scope_error;
use crate::types::{Frame, PixelLayout, Rect};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Synthetic screen: a slowly scrolling gradient in absolute coordinates.
///
/// Pixels depend only on the screen position and the grab counter, so a region
/// grab and a full-window grab of the same spot agree. Native layout is BGRA.
pub struct DryRunCapture {
    ticks: Arc<AtomicU64>,
}

impl DryRunCapture {
    pub fn new() -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for DryRunCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for DryRunCapture {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn open(&self) -> Result<Box<dyn CaptureSource>> {
        Ok(Box::new(DryRunSource {
            ticks: Arc::clone(&self.ticks),
        }))
    }
}

struct DryRunSource {
    ticks: Arc<AtomicU64>,
}

impl CaptureSource for DryRunSource {
    fn grab(&mut self, rect: &Rect) -> Result<Frame> {
        if rect.width <= 0 || rect.height <= 0 {
            return Err(scope_error!(capture, "empty capture rectangle {}", rect));
        }

        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) / 8;
        let (width, height) = (rect.width as u32, rect.height as u32);
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);

        for y in 0..rect.height {
            for x in 0..rect.width {
                let ax = (rect.left + x) as i64;
                let ay = (rect.top + y) as i64;
                let r = ((ax + tick as i64) & 0xff) as u8;
                let g = (ay & 0xff) as u8;
                let b = (((ax ^ ay) >> 2) & 0xff) as u8;
                data.extend_from_slice(&[b, g, r, 255]);
            }
        }

        Frame::new(width, height, PixelLayout::Bgra8, data)
    }
}

impl Drop for DryRunSource {
    fn drop(&mut self) {
        debug!("Dry-run capture source released");
    }
}
