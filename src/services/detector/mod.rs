mod dry_run;
mod postprocess;
#[cfg(feature = "backend-tract")]
mod tract;
mod r#trait;

pub use self::r#trait::{create_detector_factory, Detector, DetectorFactory};
