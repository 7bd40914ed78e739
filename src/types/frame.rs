use crate::error::Result;
use crate::scope_error;
use image::{RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Channel order of a packed 8-bit pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    Rgba8,
    Bgra8,
    Rgb8,
    Bgr8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgba8 | PixelLayout::Bgra8 => 4,
            PixelLayout::Rgb8 | PixelLayout::Bgr8 => 3,
        }
    }

    /// Index of the red/green/blue bytes inside one pixel.
    fn rgb_offsets(self) -> [usize; 3] {
        match self {
            PixelLayout::Rgba8 | PixelLayout::Rgb8 => [0, 1, 2],
            PixelLayout::Bgra8 | PixelLayout::Bgr8 => [2, 1, 0],
        }
    }

    fn has_alpha(self) -> bool {
        matches!(self, PixelLayout::Rgba8 | PixelLayout::Bgra8)
    }
}

/// Raw pixels as produced by a capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, layout: PixelLayout, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * layout.bytes_per_pixel();
        if data.len() != expected {
            return Err(scope_error!(
                capture,
                "{}x{} {:?} frame needs {} bytes, got {}",
                width,
                height,
                layout,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Pixels in the RGB order detectors expect; alpha is dropped.
    pub fn to_rgb(&self) -> Result<RgbImage> {
        let [r, g, b] = self.layout.rgb_offsets();
        let bpp = self.layout.bytes_per_pixel();
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for px in self.data.chunks_exact(bpp) {
            out.extend_from_slice(&[px[r], px[g], px[b]]);
        }
        RgbImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| scope_error!(capture, "failed to build RGB image buffer"))
    }

    pub fn to_rgba(&self) -> Result<RgbaImage> {
        let [r, g, b] = self.layout.rgb_offsets();
        let bpp = self.layout.bytes_per_pixel();
        let alpha = self.layout.has_alpha();
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for px in self.data.chunks_exact(bpp) {
            let a = if alpha { px[3] } else { 255 };
            out.extend_from_slice(&[px[r], px[g], px[b], a]);
        }
        RgbaImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| scope_error!(capture, "failed to build RGBA image buffer"))
    }
}

/// Pack an RGBA image into `layout`.
pub fn encode_layout(image: &RgbaImage, layout: PixelLayout) -> Vec<u8> {
    let bpp = layout.bytes_per_pixel();
    let mut out = Vec::with_capacity(image.width() as usize * image.height() as usize * bpp);
    for Rgba([r, g, b, a]) in image.pixels().copied() {
        match layout {
            PixelLayout::Rgba8 => out.extend_from_slice(&[r, g, b, a]),
            PixelLayout::Bgra8 => out.extend_from_slice(&[b, g, r, a]),
            PixelLayout::Rgb8 => out.extend_from_slice(&[r, g, b]),
            PixelLayout::Bgr8 => out.extend_from_slice(&[b, g, r]),
        }
    }
    out
}
