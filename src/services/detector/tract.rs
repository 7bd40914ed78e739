use super::postprocess::{decode_yolov8, load_labels, non_max_suppression, to_raw_detection};
use super::r#trait::{Detector, DetectorFactory};
use crate::config::DetectorConfig;
use crate::error::{Result, ScopeError};
use crate::scope_error;
use crate::types::{RawDetection, Region};
use crate::utils::ModelFinder;
use image::imageops::FilterType;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tract_onnx::prelude::*;

type YoloPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// YOLOv8 ONNX models run through tract. Each worker loads its own plan.
pub struct TractYoloFactory {
    model_path: PathBuf,
    input_size: u32,
    iou_threshold: f32,
    labels: Arc<Vec<String>>,
}

impl TractYoloFactory {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let labels = match &config.labels_path {
            Some(path) => {
                let labels = load_labels(path)?;
                info!("Loaded {} class labels from {:?}", labels.len(), path);
                labels
            }
            None => Vec::new(),
        };

        Ok(Self {
            model_path: config.model_path.clone(),
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
            labels: Arc::new(labels),
        })
    }

    fn build_plan(&self) -> TractResult<YoloPlan> {
        let size = self.input_size as usize;
        tract_onnx::onnx()
            .model_for_path(&self.model_path)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )?
            .into_optimized()?
            .into_runnable()
    }
}

impl DetectorFactory for TractYoloFactory {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn model_path(&self) -> Option<&Path> {
        Some(&self.model_path)
    }

    fn check(&self) -> Result<()> {
        ModelFinder::inspect(&self.model_path)?;
        let is_onnx = self
            .model_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("onnx"))
            .unwrap_or(false);
        if !is_onnx {
            return Err(ScopeError::UnsupportedModel {
                path: self.model_path.clone(),
                reason: "the tract backend only loads .onnx models".to_string(),
            });
        }
        Ok(())
    }

    fn load(&self, region: &Region) -> Result<Box<dyn Detector>> {
        let plan = self.build_plan().map_err(|e| ScopeError::WorkerStart {
            region_id: region.id,
            reason: format!("failed to load {:?}: {}", self.model_path, e),
        })?;
        info!("Model {:?} loaded for {}", self.model_path, region);

        Ok(Box::new(TractYoloDetector {
            plan,
            input_size: self.input_size,
            iou_threshold: self.iou_threshold,
            labels: Arc::clone(&self.labels),
        }))
    }
}

struct TractYoloDetector {
    plan: YoloPlan,
    input_size: u32,
    iou_threshold: f32,
    labels: Arc<Vec<String>>,
}

impl TractYoloDetector {
    fn build_input(&self, image: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl Detector for TractYoloDetector {
    fn detect(&mut self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        let input = self.build_input(image);
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| scope_error!(detector, "ONNX inference failed: {}", e))?;

        let output = outputs
            .first()
            .ok_or_else(|| scope_error!(detector, "model produced no outputs"))?;
        let shape = output.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(scope_error!(detector, "unexpected YOLO output shape {:?}", shape));
        }
        let values = output
            .as_slice::<f32>()
            .map_err(|e| scope_error!(detector, "model output is not f32: {}", e))?;

        let candidates = decode_yolov8(values, shape[1], shape[2], confidence_threshold)?;
        let kept = non_max_suppression(candidates, self.iou_threshold);

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;
        Ok(kept
            .iter()
            .map(|c| to_raw_detection(c, scale_x, scale_y, image.width(), image.height(), &self.labels))
            .collect())
    }
}
