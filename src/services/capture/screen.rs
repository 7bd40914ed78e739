use super::r#trait::{CaptureBackend, CaptureSource};
use crate::error::Result;
use crate::scope_error;
use crate::types::{Frame, PixelLayout, Rect};
use screenshots::Screen;
use tracing::{debug, info};

/// Desktop capture through the `screenshots` crate. Native layout is RGBA.
pub struct ScreenCapture;

impl ScreenCapture {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScreenCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for ScreenCapture {
    fn name(&self) -> &'static str {
        "screen"
    }

    fn open(&self) -> Result<Box<dyn CaptureSource>> {
        let screens = Screen::all().map_err(|e| scope_error!(capture, "no screens: {}", e))?;
        if screens.is_empty() {
            return Err(scope_error!(capture, "no screens found"));
        }
        info!("Screen capture opened ({} screens)", screens.len());
        Ok(Box::new(ScreenSource { screens }))
    }
}

struct ScreenSource {
    screens: Vec<Screen>,
}

impl ScreenSource {
    /// Screen containing the rectangle's top-left corner, falling back to the first one.
    fn screen_for(&self, rect: &Rect) -> &Screen {
        self.screens
            .iter()
            .find(|screen| {
                let info = &screen.display_info;
                let bounds = Rect::new(info.x, info.y, info.width as i32, info.height as i32);
                bounds.contains_point(rect.left, rect.top)
            })
            .unwrap_or(&self.screens[0])
    }
}

impl CaptureSource for ScreenSource {
    fn grab(&mut self, rect: &Rect) -> Result<Frame> {
        if rect.width <= 0 || rect.height <= 0 {
            return Err(scope_error!(capture, "empty capture rectangle {}", rect));
        }

        let screen = self.screen_for(rect);
        let info = &screen.display_info;
        let image = screen
            .capture_area(
                rect.left - info.x,
                rect.top - info.y,
                rect.width as u32,
                rect.height as u32,
            )
            .map_err(|e| scope_error!(capture, "capture of {} failed: {}", rect, e))?;

        let (width, height) = (image.width(), image.height());
        Frame::new(width, height, PixelLayout::Rgba8, image.into_raw())
    }
}

impl Drop for ScreenSource {
    fn drop(&mut self) {
        debug!("Screen capture released");
    }
}
