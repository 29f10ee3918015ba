//! Detection records and the merging trait

use crate::geometry::BoundingBox;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single box reported by one model for one image
///
/// Fields are private: a detection is fixed once it has been parsed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    class_id: u32,
    confidence: f64,
    bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }

    pub fn class_id(&self) -> u32 {
        self.class_id
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
}

/// Consensus detection produced from a cluster of source detections
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergedDetection {
    pub class_id: u32,
    pub confidence: f64,
    pub bbox: BoundingBox,
    /// Number of source detections fused into this one
    pub members: usize,
}

/// Label-file line: `class confidence(4dp) x1 y1 x2 y2 (1dp)`
impl fmt::Display for MergedDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.4} {:.1} {:.1} {:.1} {:.1}",
            self.class_id, self.confidence, self.bbox.x1, self.bbox.y1, self.bbox.x2, self.bbox.y2
        )
    }
}

/// Trait for types that fuse per-model detection lists into one list
pub trait DetectionMerger {
    /// Merge the detections of every model for a single image.
    ///
    /// `detections_per_model` is indexed by model position; the position, not
    /// the model's identity, is what drives clustering order.
    fn merge(&self, detections_per_model: &[Vec<Detection>]) -> Vec<MergedDetection>;
}
