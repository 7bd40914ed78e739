mod dry_run;
#[cfg(feature = "screen-capture")]
mod screen;
mod r#trait;

pub use self::r#trait::{create_capture_backend, CaptureBackend, CaptureSource};
