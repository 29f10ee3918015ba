use assert_cmd::Command;
use insta::assert_snapshot;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// End-to-end runs of `boxvote run` and `boxvote fuse` over a throwaway
/// detections tree. The per-user config dir is redirected into the temp dir
/// so a developer's own config never leaks into the results.

struct Workspace {
    tmp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            tmp: TempDir::new().unwrap(),
        }
    }

    fn input(&self) -> PathBuf {
        self.tmp.path().join("raw_detections")
    }

    fn output(&self) -> PathBuf {
        self.tmp.path().join("ensemble_output")
    }

    fn write(&self, model: &str, video: &str, image: &str, body: &str) -> PathBuf {
        let dir = self.input().join(model).join(video);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(image);
        fs::write(&path, body).unwrap();
        path
    }

    fn read_output(&self, video: &str, image: &str) -> String {
        fs::read_to_string(self.output().join(video).join(image)).unwrap()
    }

    fn boxvote(&self) -> Command {
        let mut cmd = Command::cargo_bin("boxvote").unwrap();
        cmd.env("HOME", self.tmp.path())
            .env("XDG_CONFIG_HOME", self.tmp.path().join("xdg"))
            .env_remove("BOXVOTE_CONFIG")
            .env_remove("RUST_LOG")
            .env_remove("BOXVOTE_LOG_FORMAT");
        cmd
    }

    fn run_args(&self) -> Vec<String> {
        vec![
            "run".into(),
            "--input".into(),
            path_arg(&self.input()),
            "--output".into(),
            path_arg(&self.output()),
            "--model".into(),
            "yolov5s".into(),
            "--model".into(),
            "yolov8n".into(),
            "--no-color".into(),
        ]
    }

    fn scenario(&self) {
        self.write(
            "yolov5s",
            "street",
            "frame_0000.txt",
            "0 0.9000 10.0 10.0 50.0 50.0\n1 0.7000 100.0 100.0 150.0 150.0\n",
        );
        self.write(
            "yolov8n",
            "street",
            "frame_0000.txt",
            "0 0.8000 12.0 12.0 52.0 52.0\n",
        );
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn test_run_writes_merged_labels() {
    let ws = Workspace::new();
    ws.scenario();

    ws.boxvote()
        .args(ws.run_args())
        .assert()
        .success()
        .stdout(predicate::str::contains("Models: yolov5s, yolov8n (iou >= 0.5)"))
        .stdout(predicate::str::contains(
            "street: 1 images, 3 detections -> 2 merged",
        ))
        .stdout(predicate::str::contains("Person = 1"))
        .stdout(predicate::str::contains("Dog = 1"));

    assert_snapshot!(ws.read_output("street", "frame_0000.txt"), @r"
    0 0.8500 10.9 10.9 50.9 50.9
    1 0.7000 100.0 100.0 150.0 150.0
    ");
}

#[test]
fn test_run_json_report() {
    let ws = Workspace::new();
    ws.scenario();
    ws.write("yolov8n", "park", "frame_0001.txt", "3 0.4 1 1 9 9\n7 0.9 1 1 9 9\n");

    let output = ws
        .boxvote()
        .args(ws.run_args())
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["version"], "0.1.0");
    assert_eq!(report["iou_threshold"], 0.5);
    assert_eq!(report["models"], serde_json::json!(["yolov5s", "yolov8n"]));

    let videos = report["videos"].as_array().unwrap();
    let names: Vec<&str> = videos.iter().map(|v| v["video"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["park", "street"]);
    assert_eq!(videos[0]["filtered_records"], 1);
    assert_eq!(videos[0]["classes"]["Car"], 1);
    assert_eq!(videos[1]["merged_out"], 2);
}

#[test]
fn test_run_single_video() {
    let ws = Workspace::new();
    ws.scenario();
    ws.write("yolov5s", "park", "frame_0000.txt", "2 0.5 0 0 10 10\n");

    ws.boxvote()
        .args(ws.run_args())
        .args(["--video", "park"])
        .assert()
        .success()
        .stdout(predicate::str::contains("park: 1 images"))
        .stdout(predicate::str::contains("street").not());

    assert!(ws.output().join("park/frame_0000.txt").exists());
    assert!(!ws.output().join("street").exists());
}

#[test]
fn test_run_stricter_threshold_keeps_boxes_apart() {
    let ws = Workspace::new();
    ws.scenario();

    ws.boxvote()
        .args(ws.run_args())
        .args(["--iou", "0.9"])
        .assert()
        .success();

    assert_snapshot!(ws.read_output("street", "frame_0000.txt"), @r"
    0 0.9000 10.0 10.0 50.0 50.0
    1 0.7000 100.0 100.0 150.0 150.0
    0 0.8000 12.0 12.0 52.0 52.0
    ");
}

#[test]
fn test_run_rejects_out_of_range_threshold() {
    let ws = Workspace::new();
    ws.scenario();

    ws.boxvote()
        .args(ws.run_args())
        .args(["--iou", "1.5"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("iou_threshold must be in (0, 1]"));

    assert!(!ws.output().exists());
}

#[test]
fn test_run_rejects_duplicate_models() {
    let ws = Workspace::new();

    ws.boxvote()
        .args(["run", "--model", "a", "--model", "a"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("listed more than once"));
}

#[cfg(unix)]
#[test]
fn test_run_exits_one_when_an_image_fails() {
    let ws = Workspace::new();
    ws.scenario();
    fs::create_dir_all(ws.input().join("yolov8n/street/frame_0001.txt")).unwrap();
    ws.write("yolov5s", "street", "frame_0001.txt", "0 0.5 0 0 10 10\n");

    ws.boxvote()
        .args(ws.run_args())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("failed: frame_0001.txt"));

    assert!(ws.output().join("street/frame_0000.txt").exists());
}

#[test]
fn test_fuse_prints_labels() {
    let ws = Workspace::new();
    let a = ws.write("a", "clip", "f.txt", "0 0.9000 10.0 10.0 50.0 50.0\n");
    let b = ws.write("b", "clip", "f.txt", "0 0.8000 12.0 12.0 52.0 52.0\n");

    ws.boxvote()
        .arg("fuse")
        .arg(&a)
        .arg(&b)
        .assert()
        .success()
        .stdout("0 0.8500 10.9 10.9 50.9 50.9\n");
}

#[test]
fn test_fuse_json() {
    let ws = Workspace::new();
    let a = ws.write("a", "clip", "f.txt", "4 0.6 1 2 3 4\n");
    let missing = ws.input().join("b/clip/f.txt");

    let output = ws
        .boxvote()
        .arg("fuse")
        .arg(&a)
        .arg(&missing)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let merged: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let merged = merged.as_array().unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0]["class_id"], 4);
    assert_eq!(merged[0]["members"], 1);
}

#[test]
fn test_fuse_requires_files() {
    let ws = Workspace::new();
    ws.boxvote()
        .arg("fuse")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_schema_describes_run_report() {
    let ws = Workspace::new();
    ws.boxvote()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("RunReport"))
        .stdout(predicate::str::contains("failed_images"));
}

#[test]
fn test_json_logs_go_to_stderr() {
    let ws = Workspace::new();
    ws.scenario();

    let output = ws
        .boxvote()
        .env("BOXVOTE_LOG_FORMAT", "json")
        .args(ws.run_args())
        .args(["--json", "-v"])
        .output()
        .unwrap();
    assert!(output.status.success());

    // stdout stays a single JSON document
    let _: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("starting ensemble run"));
    assert!(stderr.lines().all(|l| l.trim_start().starts_with('{')));
}
