use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reasons a set of coordinates cannot form a [`BoundingBox`]
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum BoxError {
    #[error("coordinate is not a finite number")]
    NonFinite,
    #[error("inverted box: x1={x1} > x2={x2}")]
    InvertedX { x1: f64, x2: f64 },
    #[error("inverted box: y1={y1} > y2={y2}")]
    InvertedY { y1: f64, y2: f64 },
}

/// Axis-aligned box in source-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    /// Build a box, rejecting non-finite or inverted coordinates.
    pub fn try_new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, BoxError> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(BoxError::NonFinite);
        }
        if x1 > x2 {
            return Err(BoxError::InvertedX { x1, x2 });
        }
        if y1 > y2 {
            return Err(BoxError::InvertedY { y1, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Inclusive pixel width.
    pub fn width(&self) -> f64 {
        self.x2 - self.x1 + 1.0
    }

    /// Inclusive pixel height.
    pub fn height(&self) -> f64 {
        self.y2 - self.y1 + 1.0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        iou(self, other)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Intersection-over-union of two boxes.
///
/// Intersection and areas use the inclusive-pixel convention, so two
/// identical boxes score exactly `1.0` and boxes that do not touch score
/// `0.0` without computing a union.
///
/// # Panics
///
/// Panics if the union is not positive. Boxes built through
/// [`BoundingBox::try_new`] always have an area of at least one pixel, so this
/// only fires for hand-built inverted boxes.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let xa = a.x1.max(b.x1);
    let ya = a.y1.max(b.y1);
    let xb = a.x2.min(b.x2);
    let yb = a.y2.min(b.y2);

    let intersection = (xb - xa + 1.0).max(0.0) * (yb - ya + 1.0).max(0.0);
    if intersection == 0.0 {
        return 0.0;
    }

    let union = a.area() + b.area() - intersection;
    assert!(union > 0.0, "degenerate union between {a} and {b}");

    intersection / union
}
