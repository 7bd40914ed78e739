#![cfg_attr(not(feature = "backend-tract"), allow(dead_code))]

use crate::error::Result;
use crate::scope_error;
use crate::types::{BoundingBox, RawDetection};
use std::fs;
use std::path::Path;

/// Candidate box in model pixel space before rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

pub fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Class-wise greedy NMS, highest score first.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Decode a YOLOv8 head laid out as `[4 + classes][anchors]` (cx, cy, w, h, scores...).
pub fn decode_yolov8(
    output: &[f32],
    attributes: usize,
    anchors: usize,
    confidence_threshold: f32,
) -> Result<Vec<Candidate>> {
    if attributes < 5 {
        return Err(scope_error!(detector, "YOLO output has {} attributes, need at least 5", attributes));
    }
    if output.len() != attributes * anchors {
        return Err(scope_error!(
            detector,
            "YOLO output holds {} values, expected {}x{}",
            output.len(),
            attributes,
            anchors
        ));
    }

    let at = |attr: usize, anchor: usize| output[attr * anchors + anchor];
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let (class_id, score) = (4..attributes)
            .map(|attr| (attr - 4, at(attr, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        candidates.push(Candidate {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            score,
            class_id,
        });
    }

    Ok(candidates)
}

/// Map a model-space candidate back onto the source image.
pub fn to_raw_detection(
    candidate: &Candidate,
    scale_x: f32,
    scale_y: f32,
    image_width: u32,
    image_height: u32,
    labels: &[String],
) -> RawDetection {
    let clamp_x = |v: f32| (v * scale_x).round().clamp(0.0, image_width as f32) as i32;
    let clamp_y = |v: f32| (v * scale_y).round().clamp(0.0, image_height as f32) as i32;

    RawDetection::new(
        BoundingBox::new(
            clamp_x(candidate.x1),
            clamp_y(candidate.y1),
            clamp_x(candidate.x2),
            clamp_y(candidate.y2),
        ),
        candidate.score,
        label_for(labels, candidate.class_id),
    )
}

pub fn label_for(labels: &[String], class_id: usize) -> String {
    labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// One class name per non-empty line.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
