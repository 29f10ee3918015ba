pub mod config;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod sampling;
pub mod taxonomy;

pub use boxvote_core::{BoundingBox, Detection, DetectionMerger, MergedDetection, iou};
pub use engine::FusionEngine;
pub use error::{Result, VoteError};
