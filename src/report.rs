//! Statistics gathered while ensembling, for humans and for scripts.

use colored::Colorize;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the JSON layout of [`RunReport`] changes
pub const REPORT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct VideoReport {
    pub video: String,
    /// Images with a merged label file written
    pub images: usize,
    /// Images skipped because a source file could not be read
    #[serde(default)]
    pub failed_images: Vec<String>,
    pub detections_in: usize,
    pub merged_out: usize,
    pub malformed_records: usize,
    pub filtered_records: usize,
    /// Merged detections per class name
    #[serde(default)]
    pub classes: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FailedVideo {
    pub video: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RunReport {
    pub version: String,
    pub models: Vec<String>,
    pub iou_threshold: f64,
    pub videos: Vec<VideoReport>,
    #[serde(default)]
    pub failed_videos: Vec<FailedVideo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub images: usize,
    pub failed_images: usize,
    pub detections_in: usize,
    pub merged_out: usize,
}

impl RunReport {
    pub fn new(models: Vec<String>, iou_threshold: f64) -> Self {
        Self {
            version: REPORT_VERSION.to_string(),
            models,
            iou_threshold,
            videos: Vec::new(),
            failed_videos: Vec::new(),
        }
    }

    pub fn totals(&self) -> Totals {
        self.videos.iter().fold(Totals::default(), |acc, v| Totals {
            images: acc.images + v.images,
            failed_images: acc.failed_images + v.failed_images.len(),
            detections_in: acc.detections_in + v.detections_in,
            merged_out: acc.merged_out + v.merged_out,
        })
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_videos.is_empty() || self.videos.iter().any(|v| !v.failed_images.is_empty())
    }
}

fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().cyan().to_string()
    } else {
        text.to_string()
    }
}

fn failure(text: &str, color: bool) -> String {
    if color {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

/// Render the report as indented plain text.
pub fn render_human(report: &RunReport, color: bool) -> String {
    let mut out = String::new();

    out.push_str(&heading("Models:", color));
    out.push(' ');
    out.push_str(&report.models.join(", "));
    out.push_str(&format!(" (iou >= {})", report.iou_threshold));

    out.push('\n');
    out.push_str(&heading("Videos:", color));
    for video in &report.videos {
        out.push_str(&format!(
            "\n  {}: {} images, {} detections -> {} merged",
            video.video, video.images, video.detections_in, video.merged_out
        ));
        if video.malformed_records > 0 {
            out.push_str(&format!(", {} malformed", video.malformed_records));
        }
        for (class, count) in &video.classes {
            out.push_str(&format!("\n    {} = {}", class, count));
        }
        for image in &video.failed_images {
            out.push_str("\n    ");
            out.push_str(&failure(&format!("failed: {}", image), color));
        }
    }
    for failed in &report.failed_videos {
        out.push_str("\n  ");
        out.push_str(&failure(
            &format!("{}: failed ({})", failed.video, failed.error),
            color,
        ));
    }

    let totals = report.totals();
    out.push('\n');
    out.push_str(&heading("Totals:", color));
    out.push_str(&format!(
        " {} images, {} detections -> {} merged",
        totals.images, totals.detections_in, totals.merged_out
    ));
    if totals.failed_images > 0 {
        out.push_str(&format!(", {} failed", totals.failed_images));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::{assert_json_snapshot, assert_snapshot};

    fn sample_report() -> RunReport {
        let mut report = RunReport::new(vec!["yolov5s".into(), "yolov8n".into()], 0.5);
        report.videos.push(VideoReport {
            video: "street".into(),
            images: 2,
            failed_images: vec![],
            detections_in: 5,
            merged_out: 3,
            malformed_records: 1,
            filtered_records: 0,
            classes: BTreeMap::from([("Car".into(), 2), ("Person".into(), 1)]),
        });
        report.videos.push(VideoReport {
            video: "park".into(),
            images: 1,
            failed_images: vec!["frame_0002.txt".into()],
            detections_in: 1,
            merged_out: 1,
            malformed_records: 0,
            filtered_records: 4,
            classes: BTreeMap::from([("Dog".into(), 1)]),
        });
        report
    }

    #[test]
    fn test_totals() {
        let totals = sample_report().totals();
        assert_eq!(
            totals,
            Totals {
                images: 3,
                failed_images: 1,
                detections_in: 6,
                merged_out: 4,
            }
        );
    }

    #[test]
    fn test_has_failures() {
        let mut report = sample_report();
        assert!(report.has_failures());

        report.videos[1].failed_images.clear();
        assert!(!report.has_failures());

        report.failed_videos.push(FailedVideo {
            video: "broken".into(),
            error: "permission denied".into(),
        });
        assert!(report.has_failures());
    }

    #[test]
    fn test_render_human_plain() {
        assert_snapshot!(render_human(&sample_report(), false), @r"
        Models: yolov5s, yolov8n (iou >= 0.5)
        Videos:
          street: 2 images, 5 detections -> 3 merged, 1 malformed
            Car = 2
            Person = 1
          park: 1 images, 1 detections -> 1 merged
            Dog = 1
            failed: frame_0002.txt
        Totals: 3 images, 6 detections -> 4 merged, 1 failed
        ");
    }

    #[test]
    fn test_video_report_json_layout() {
        assert_json_snapshot!(sample_report().videos[0], @r#"
        {
          "video": "street",
          "images": 2,
          "failed_images": [],
          "detections_in": 5,
          "merged_out": 3,
          "malformed_records": 1,
          "filtered_records": 0,
          "classes": {
            "Car": 2,
            "Person": 1
          }
        }
        "#);
    }

    #[test]
    fn test_json_schema_generates() {
        let schema = schemars::schema_for!(RunReport);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("RunReport"));
        assert!(json.contains("VideoReport"));
        assert!(json.contains("iou_threshold"));
    }
}
