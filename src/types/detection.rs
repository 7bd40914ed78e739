use super::{region_to_absolute, BoundingBox, Region};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One box as returned by a detector, in region-local pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_label: String,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_label: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            class_label: class_label.into(),
        }
    }
}

/// A published detection. Coordinates are always absolute screen pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_label: String,
    pub region_id: u32,
    pub source_region: Region,
}

impl Detection {
    /// Lift a detector result out of `region` into screen space.
    pub fn from_raw(raw: RawDetection, region: &Region) -> Self {
        Self {
            bbox: region_to_absolute(raw.bbox, region),
            confidence: raw.confidence.clamp(0.0, 1.0),
            class_label: raw.class_label,
            region_id: region.id,
            source_region: *region,
        }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.2} region #{} ({}, {}, {}, {})",
            self.class_label,
            self.confidence,
            self.region_id,
            self.bbox.x1,
            self.bbox.y1,
            self.bbox.x2,
            self.bbox.y2
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_translates_and_tags_region() {
        let region = Region::new(3, 400, 300, 400, 300);
        let raw = RawDetection::new(BoundingBox::new(10, 20, 50, 60), 0.87, "person");

        let detection = Detection::from_raw(raw, &region);

        assert_eq!(detection.bbox, BoundingBox::new(410, 320, 450, 360));
        assert_eq!(detection.region_id, 3);
        assert_eq!(detection.source_region, region);
        assert_eq!(detection.class_label, "person");
    }

    #[test]
    fn from_raw_clamps_confidence() {
        let region = Region::new(0, 0, 0, 10, 10);
        let raw = RawDetection::new(BoundingBox::new(0, 0, 1, 1), 1.3, "cat");
        assert_eq!(Detection::from_raw(raw, &region).confidence, 1.0);
    }
}
