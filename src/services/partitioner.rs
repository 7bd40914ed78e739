use crate::error::{Result, ScopeError};
use crate::types::{Rect, Region};
use smallvec::SmallVec;

/// Regions for one window; four inline covers the default quadrant split.
pub type Regions = SmallVec<[Region; 4]>;

/// Grid shape `(cols, rows)` for `divisions` cells.
///
/// `rows` is the largest divisor not above `sqrt(divisions)`, so 4 -> 2x2, 6 -> 3x2, 5 -> 5x1.
pub fn grid_shape(divisions: u32) -> (u32, u32) {
    let mut rows = 1;
    let mut candidate: u32 = 1;
    while candidate
        .checked_mul(candidate)
        .is_some_and(|square| square <= divisions)
    {
        if divisions % candidate == 0 {
            rows = candidate;
        }
        candidate += 1;
    }
    (divisions / rows, rows)
}

/// Split `window` into `divisions` non-overlapping regions, row-major, ids `0..divisions`.
///
/// The last column and row absorb whatever integer division leaves over.
pub fn partition(window: &Rect, divisions: u32) -> Result<Regions> {
    if window.width <= 0 || window.height <= 0 {
        return ScopeError::invalid_window(
            window.width,
            window.height,
            "width and height must be positive",
        );
    }
    if divisions == 0 {
        return ScopeError::invalid_window(window.width, window.height, "zero divisions requested");
    }

    let (cols, rows) = grid_shape(divisions);
    // width and height are positive here
    if cols > window.width as u32 || rows > window.height as u32 {
        return ScopeError::invalid_window(
            window.width,
            window.height,
            format!("too small for a {}x{} grid", cols, rows),
        );
    }

    let cell_width = window.width / cols as i32;
    let cell_height = window.height / rows as i32;

    let mut regions = Regions::with_capacity(divisions as usize);
    for row in 0..rows {
        for col in 0..cols {
            let left = window.left + col as i32 * cell_width;
            let top = window.top + row as i32 * cell_height;
            let width = if col + 1 == cols {
                window.right() - left
            } else {
                cell_width
            };
            let height = if row + 1 == rows {
                window.bottom() - top
            } else {
                cell_height
            };
            regions.push(Region::new(row * cols + col, left, top, width, height));
        }
    }

    Ok(regions)
}
