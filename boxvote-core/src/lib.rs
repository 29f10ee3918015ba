//! Shared detection types for boxvote
//!
//! This crate holds the data every stage of the ensembling pipeline agrees on:
//! the raw [`Detection`] a model emits, the [`MergedDetection`] produced by
//! fusing a cluster of them, the [`BoundingBox`] geometry they carry, and the
//! [`DetectionMerger`] trait implemented by fusion engines.
//!
//! # Usage
//!
//! ```rust
//! use boxvote_core::{BoundingBox, Detection, iou};
//!
//! let a = Detection::new(0, 0.9, BoundingBox::try_new(10.0, 10.0, 50.0, 50.0).unwrap());
//! let b = Detection::new(0, 0.8, BoundingBox::try_new(12.0, 12.0, 52.0, 52.0).unwrap());
//!
//! assert!(iou(a.bbox(), b.bbox()) > 0.5);
//! ```
//!
//! # Coordinate convention
//!
//! Boxes are `(x1, y1, x2, y2)` in the pixel space of the source image and are
//! treated as inclusive pixel indices: a box from `0` to `9` is ten pixels
//! wide. Areas and intersections follow that convention so numbers line up
//! with label files produced by the rest of the pipeline.

mod detection;
mod geometry;

pub use detection::{Detection, DetectionMerger, MergedDetection};
pub use geometry::{BoundingBox, BoxError, iou};
