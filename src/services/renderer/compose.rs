use crate::error::Result;
use crate::scope_error;
use crate::services::display::DisplayFrame;
use crate::types::{absolute_to_frame, encode_layout, BoundingBox, Detection, Frame, PixelLayout, Rect};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

pub const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const LABEL_TEXT: Rgba<u8> = Rgba([0, 255, 0, 255]);
const LABEL_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
/// Distance between the label baseline area and the box top edge.
const LABEL_RAISE: i32 = 10;
const GLYPH: i32 = 8;

/// Where a scaled frame lands on the destination surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Largest aspect-preserving size of `frame` inside `dest`, centered.
/// An unknown destination (`0` in either dimension) keeps the frame as is.
pub fn fit_within(frame: (u32, u32), dest: (u32, u32)) -> Placement {
    let (fw, fh) = frame;
    let (dw, dh) = dest;
    if fw == 0 || fh == 0 || dw == 0 || dh == 0 {
        return Placement {
            width: fw,
            height: fh,
            offset_x: 0,
            offset_y: 0,
        };
    }

    let (width, height) = if dw as u64 * fh as u64 <= dh as u64 * fw as u64 {
        (dw, ((fh as u64 * dw as u64) / fw as u64).max(1) as u32)
    } else {
        (((fw as u64 * dh as u64) / fh as u64).max(1) as u32, dh)
    };

    Placement {
        width,
        height,
        offset_x: (dw - width) / 2,
        offset_y: (dh - height) / 2,
    }
}

pub fn format_label(detection: &Detection) -> String {
    format!("{}: {:.2}", detection.class_label, detection.confidence)
}

fn put(image: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// Outline `bbox` (frame coordinates) growing inward by `thickness` pixels. Clipped to the image.
pub fn draw_box(image: &mut RgbaImage, bbox: BoundingBox, thickness: u32, color: Rgba<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if bbox.x2 < 0 || bbox.y2 < 0 || bbox.x1 >= w || bbox.y1 >= h {
        return;
    }

    for t in 0..thickness.max(1) as i32 {
        let (x1, y1, x2, y2) = (bbox.x1 + t, bbox.y1 + t, bbox.x2 - t, bbox.y2 - t);
        if x1 > x2 || y1 > y2 {
            break;
        }
        for x in x1.max(0)..=x2.min(w - 1) {
            put(image, x, y1, color);
            put(image, x, y2, color);
        }
        for y in y1.max(0)..=y2.min(h - 1) {
            put(image, x1, y, color);
            put(image, x2, y, color);
        }
    }
}

/// Render `text` with an 8x8 bitmap font on a solid background, top-left at `(x, y)`.
pub fn draw_label(image: &mut RgbaImage, text: &str, x: i32, y: i32) {
    let width = text.chars().count() as i32 * GLYPH;
    for py in y - 1..y + GLYPH + 1 {
        for px in x - 1..x + width + 1 {
            put(image, px, py, LABEL_BACKGROUND);
        }
    }

    let mut cursor = x;
    for ch in text.chars() {
        if let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) {
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH {
                    if (bits >> col) & 1 == 1 {
                        put(image, cursor + col, y + row as i32, LABEL_TEXT);
                    }
                }
            }
        }
        cursor += GLYPH;
    }
}

/// Draw every detection onto a capture of `window`.
pub fn annotate<'a>(
    image: &mut RgbaImage,
    window: &Rect,
    detections: impl IntoIterator<Item = &'a Detection>,
    thickness: u32,
) -> usize {
    let max_label_y = (image.height() as i32 - GLYPH).max(0);
    let mut drawn = 0;
    for detection in detections {
        let local = absolute_to_frame(detection.bbox, window);
        draw_box(image, local, thickness, BOX_COLOR);
        let label_y = (local.y1 - LABEL_RAISE).clamp(0, max_label_y);
        draw_label(image, &format_label(detection), local.x1.max(0), label_y);
        drawn += 1;
    }
    drawn
}

/// Annotate, scale to `dest` and encode into the surface's layout.
pub fn compose_frame<'a>(
    capture: &Frame,
    window: &Rect,
    detections: impl IntoIterator<Item = &'a Detection>,
    thickness: u32,
    dest: (u32, u32),
    layout: PixelLayout,
    sequence: u64,
) -> Result<DisplayFrame> {
    let mut image = capture.to_rgba()?;
    annotate(&mut image, window, detections, thickness);

    let placement = fit_within(image.dimensions(), dest);
    if (placement.width, placement.height) != image.dimensions() {
        image = imageops::resize(&image, placement.width, placement.height, FilterType::Triangle);
    }

    let data = encode_layout(&image, layout);
    let frame = Frame::new(placement.width, placement.height, layout, data)
        .map_err(|e| scope_error!(render, "composite encoding failed: {}", e))?;

    Ok(DisplayFrame {
        image: frame,
        offset_x: placement.offset_x,
        offset_y: placement.offset_y,
        sequence,
    })
}
