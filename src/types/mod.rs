pub mod detection;
pub mod frame;
pub mod geometry;
pub mod window;

pub use detection::{Detection, RawDetection};
pub use frame::{encode_layout, Frame, PixelLayout};
pub use geometry::{absolute_to_frame, region_to_absolute, BoundingBox, Rect, Region};
pub use window::WindowInfo;
