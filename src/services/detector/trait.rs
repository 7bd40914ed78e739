use crate::config::Config;
use crate::error::Result;
use crate::scope_error;
use crate::types::{RawDetection, Region};
use crate::utils::ModelFinder;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

/// Opaque object detector. One instance belongs to one worker.
pub trait Detector: Send {
    /// Run inference on an RGB image. Boxes are in the image's pixel coordinates.
    fn detect(&mut self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>>;
}

/// Builds detectors for workers from a shared configuration.
pub trait DetectorFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// Model artifact passed through to the backend, if it uses one.
    fn model_path(&self) -> Option<&Path>;

    /// Pre-flight check run before any worker starts.
    fn check(&self) -> Result<()> {
        match self.model_path() {
            Some(path) => ModelFinder::inspect(path).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Load a detector for the worker that owns `region`.
    fn load(&self, region: &Region) -> Result<Box<dyn Detector>>;
}

/// Factory function to create the detector backend named in the configuration
pub fn create_detector_factory(config: &Config, dry_run: bool) -> Result<Arc<dyn DetectorFactory>> {
    if dry_run || config.is_dry_run_detector() {
        return Ok(Arc::new(super::dry_run::DryRunDetectorFactory::new()));
    }

    match config.detector.backend.as_str() {
        #[cfg(feature = "backend-tract")]
        "tract" => Ok(Arc::new(super::tract::TractYoloFactory::new(&config.detector)?)),
        #[cfg(not(feature = "backend-tract"))]
        "tract" => Err(scope_error!(
            service_unavailable,
            "built without the `backend-tract` feature; use --dry-run"
        )),
        other => Err(scope_error!(service_unavailable, "unknown detector backend '{}'", other)),
    }
}
