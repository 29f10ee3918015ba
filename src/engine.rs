use crate::consensus::merge_cluster;
use boxvote_core::{Detection, DetectionMerger, MergedDetection};

pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Position of a detection inside the per-model lists of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterMember {
    pub model: usize,
    pub position: usize,
}

/// Detections judged to be the same object, seed first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub members: Vec<ClusterMember>,
}

impl Cluster {
    pub fn seed(&self) -> ClusterMember {
        self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Cross-model ensembling by greedy overlap clustering.
///
/// Models are scanned in list order. Every detection not yet claimed seeds a
/// cluster and then claims each unclaimed detection in *later* lists whose
/// IoU with the seed reaches the threshold. Growth is anchored on the seed
/// only, so clusters are not transitive, and a detection never looks back at
/// earlier lists.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    iou_threshold: f64,
}

impl FusionEngine {
    pub fn new(iou_threshold: f64) -> Self {
        Self { iou_threshold }
    }

    pub fn iou_threshold(&self) -> f64 {
        self.iou_threshold
    }

    /// Group detections into clusters, in seed order.
    pub fn cluster(&self, detections_per_model: &[Vec<Detection>]) -> Vec<Cluster> {
        // Claimed flags for every detection of this call, flattened by model offset
        let offsets: Vec<usize> = detections_per_model
            .iter()
            .scan(0, |next, list| {
                let start = *next;
                *next += list.len();
                Some(start)
            })
            .collect();
        let total: usize = detections_per_model.iter().map(Vec::len).sum();
        let mut claimed = vec![false; total];

        let mut clusters = Vec::new();
        for (model, list) in detections_per_model.iter().enumerate() {
            for (position, seed) in list.iter().enumerate() {
                if claimed[offsets[model] + position] {
                    continue;
                }
                claimed[offsets[model] + position] = true;
                let mut members = vec![ClusterMember { model, position }];

                for (later, candidates) in detections_per_model.iter().enumerate().skip(model + 1) {
                    for (candidate_pos, candidate) in candidates.iter().enumerate() {
                        let slot = offsets[later] + candidate_pos;
                        if claimed[slot] {
                            continue;
                        }
                        if seed.bbox().iou(candidate.bbox()) >= self.iou_threshold {
                            claimed[slot] = true;
                            members.push(ClusterMember {
                                model: later,
                                position: candidate_pos,
                            });
                        }
                    }
                }

                clusters.push(Cluster { members });
            }
        }

        clusters
    }

    pub fn fuse(&self, detections_per_model: &[Vec<Detection>]) -> Vec<MergedDetection> {
        self.fuse_with_clusters(detections_per_model)
            .into_iter()
            .map(|(_, merged)| merged)
            .collect()
    }

    /// Fuse and keep the membership of every merged detection.
    pub fn fuse_with_clusters(
        &self,
        detections_per_model: &[Vec<Detection>],
    ) -> Vec<(Cluster, MergedDetection)> {
        self.cluster(detections_per_model)
            .into_iter()
            .map(|cluster| {
                let members: Vec<&Detection> = cluster
                    .members
                    .iter()
                    .map(|m| &detections_per_model[m.model][m.position])
                    .collect();
                let merged = merge_cluster(&members);
                (cluster, merged)
            })
            .collect()
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_IOU_THRESHOLD)
    }
}

impl DetectionMerger for FusionEngine {
    fn merge(&self, detections_per_model: &[Vec<Detection>]) -> Vec<MergedDetection> {
        self.fuse(detections_per_model)
    }
}
