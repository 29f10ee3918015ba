//! Aggregation of one cluster into a consensus detection.

use boxvote_core::{BoundingBox, Detection, MergedDetection};

/// Decimal places kept on the merged confidence
pub const CONFIDENCE_DECIMALS: i32 = 4;
/// Decimal places kept on merged box coordinates
pub const COORDINATE_DECIMALS: i32 = 2;

/// Fuse cluster members into one detection.
///
/// Callers pass at least one member; clusters always contain their seed.
pub fn merge_cluster(members: &[&Detection]) -> MergedDetection {
    debug_assert!(!members.is_empty(), "cluster without a seed");

    let bbox = weighted_box(members);
    MergedDetection {
        class_id: majority_class(members),
        confidence: round_to(mean_confidence(members), CONFIDENCE_DECIMALS),
        bbox: BoundingBox {
            x1: round_to(bbox[0], COORDINATE_DECIMALS),
            y1: round_to(bbox[1], COORDINATE_DECIMALS),
            x2: round_to(bbox[2], COORDINATE_DECIMALS),
            y2: round_to(bbox[3], COORDINATE_DECIMALS),
        },
        members: members.len(),
    }
}

/// Most frequent class; ties go to the class seen first.
pub fn majority_class(members: &[&Detection]) -> u32 {
    let mut counts: Vec<(u32, usize)> = Vec::new();
    for member in members {
        match counts.iter_mut().find(|(class, _)| *class == member.class_id()) {
            Some((_, count)) => *count += 1,
            None => counts.push((member.class_id(), 1)),
        }
    }

    let mut best = counts[0];
    for &candidate in &counts[1..] {
        if candidate.1 > best.1 {
            best = candidate;
        }
    }
    best.0
}

pub fn mean_confidence(members: &[&Detection]) -> f64 {
    let total: f64 = members.iter().map(|m| m.confidence()).sum();
    total / members.len() as f64
}

/// Confidence-weighted mean of member boxes, coordinate by coordinate.
///
/// When every weight is zero the plain mean is used instead.
pub fn weighted_box(members: &[&Detection]) -> [f64; 4] {
    let weight_sum: f64 = members.iter().map(|m| m.confidence()).sum();
    let uniform = weight_sum <= 0.0;
    let total = if uniform {
        members.len() as f64
    } else {
        weight_sum
    };

    let mut acc = [0.0f64; 4];
    for member in members {
        let w = if uniform { 1.0 } else { member.confidence() };
        for (slot, coordinate) in acc.iter_mut().zip(member.bbox().to_array()) {
            *slot += coordinate * w;
        }
    }
    acc.map(|v| v / total)
}

/// Round to `decimals` places, ties to even on the scaled value.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}
