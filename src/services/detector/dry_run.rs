use super::r#trait::{Detector, DetectorFactory};
use crate::error::Result;
use crate::types::{BoundingBox, RawDetection, Region};
use image::RgbImage;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::info;

const FAKE_LABELS: [&str; 4] = ["person", "car", "dog", "bicycle"];

/// Emulated detector: one box per region drifting left to right.
pub struct DryRunDetectorFactory {
    latency: Duration,
}

impl DryRunDetectorFactory {
    pub fn new() -> Self {
        Self::with_latency(Duration::from_millis(40))
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for DryRunDetectorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorFactory for DryRunDetectorFactory {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn model_path(&self) -> Option<&Path> {
        None
    }

    fn load(&self, region: &Region) -> Result<Box<dyn Detector>> {
        info!("Dry-run: emulated detector loaded for {}", region);
        Ok(Box::new(DryRunDetector {
            label: FAKE_LABELS[region.id as usize % FAKE_LABELS.len()],
            latency: self.latency,
            step: 0,
        }))
    }
}

struct DryRunDetector {
    label: &'static str,
    latency: Duration,
    step: u32,
}

impl Detector for DryRunDetector {
    fn detect(&mut self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        self.step = self.step.wrapping_add(1);

        let (w, h) = (image.width() as i32, image.height() as i32);
        let box_w = (w / 4).max(1);
        let box_h = (h / 4).max(1);
        let travel = (w - box_w).max(1);
        let x1 = (self.step as i32 * 4) % travel;
        let y1 = (h - box_h) / 2;

        let confidence = 0.55 + (self.step % 40) as f32 / 100.0;
        if confidence < confidence_threshold {
            return Ok(Vec::new());
        }

        Ok(vec![RawDetection::new(
            BoundingBox::new(x1, y1, x1 + box_w, y1 + box_h),
            confidence,
            self.label,
        )])
    }
}
