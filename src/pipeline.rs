//! Per-video orchestration over the on-disk label layout.
//!
//! Input:  `<detections>/<model>/<video>/<stem>.txt`, one file per model.
//! Output: `<output>/<video>/<stem>.txt`, one merged file per image.

use crate::config::VoteConfig;
use crate::engine::FusionEngine;
use crate::error::{Result, VoteError};
use crate::loader::load_detections;
use crate::report::{FailedVideo, RunReport, VideoReport};
use crate::taxonomy::class_name;
use boxvote_core::{Detection, MergedDetection};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const LABEL_EXTENSION: &str = "txt";
/// Mode of written label files; temp files start out owner-only
#[cfg(unix)]
const LABEL_FILE_MODE: u32 = 0o644;

/// Result of fusing one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageOutcome {
    pub detections_in: usize,
    pub merged: Vec<MergedDetection>,
    pub malformed: usize,
    pub filtered: usize,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    engine: FusionEngine,
    allowed_classes: BTreeSet<u32>,
    models: Vec<String>,
    input_root: PathBuf,
    output_root: PathBuf,
    jobs: usize,
}

impl Pipeline {
    pub fn new(
        engine: FusionEngine,
        allowed_classes: BTreeSet<u32>,
        models: Vec<String>,
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            allowed_classes,
            models,
            input_root: input_root.into(),
            output_root: output_root.into(),
            jobs: 0,
        }
    }

    /// Build from an already validated configuration.
    pub fn from_config(config: &VoteConfig) -> Self {
        Self::new(
            FusionEngine::new(config.fusion.iou_threshold),
            config.fusion.allowed_classes.clone(),
            config.models.names.clone(),
            config.paths.detections.clone(),
            config.paths.output.clone(),
        )
        .with_jobs(config.runtime.jobs)
    }

    /// Worker threads for per-image fusion, 0 = one per core.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Every video directory found under any model, sorted.
    pub fn discover_videos(&self) -> Result<Vec<String>> {
        let mut videos = BTreeSet::new();
        for model in &self.models {
            let model_dir = self.input_root.join(model);
            if !model_dir.is_dir() {
                debug!(model = %model, "no detections directory for model");
                continue;
            }
            for entry in fs::read_dir(&model_dir).map_err(|e| VoteError::io(&model_dir, e))? {
                let entry = entry.map_err(|e| VoteError::io(&model_dir, e))?;
                if entry.path().is_dir()
                    && let Some(name) = entry.file_name().to_str()
                {
                    videos.insert(name.to_string());
                }
            }
        }
        Ok(videos.into_iter().collect())
    }

    /// Union of label file names across models for one video, sorted.
    ///
    /// A model that has no directory for the video contributes nothing.
    pub fn discover_images(&self, video: &str) -> Result<Vec<String>> {
        let mut images = BTreeSet::new();
        for dir in self.model_dirs(video) {
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir).map_err(|e| VoteError::io(&dir, e))? {
                let entry = entry.map_err(|e| VoteError::io(&dir, e))?;
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == LABEL_EXTENSION)
                    && path.is_file()
                    && let Some(name) = entry.file_name().to_str()
                {
                    images.insert(name.to_string());
                }
            }
        }
        Ok(images.into_iter().collect())
    }

    /// Fuse every image of one video and write the merged label files.
    pub fn run_video(&self, video: &str) -> Result<VideoReport> {
        let pool = self.thread_pool()?;
        pool.install(|| self.process_video(video))
    }

    /// Run every discovered video. A video that cannot be listed is recorded
    /// in the report and the run moves on.
    pub fn run_all(&self) -> Result<RunReport> {
        let videos = self.discover_videos()?;
        self.run_videos(&videos)
    }

    pub fn run_videos(&self, videos: &[String]) -> Result<RunReport> {
        let pool = self.thread_pool()?;
        let mut report = RunReport::new(self.models.clone(), self.engine.iou_threshold());

        for video in videos {
            match pool.install(|| self.process_video(video)) {
                Ok(video_report) => report.videos.push(video_report),
                Err(e) => {
                    warn!(video = %video, error = %e, "video skipped");
                    report.failed_videos.push(FailedVideo {
                        video: video.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Fuse one image from explicit per-model sources, in model order.
    pub fn fuse_sources(&self, sources: &[PathBuf]) -> Result<ImageOutcome> {
        let mut per_model: Vec<Vec<Detection>> = Vec::with_capacity(sources.len());
        let mut malformed = 0;
        let mut filtered = 0;

        for source in sources {
            let outcome = load_detections(source, &self.allowed_classes)?;
            malformed += outcome.malformed;
            filtered += outcome.filtered;
            per_model.push(outcome.detections);
        }

        let detections_in = per_model.iter().map(Vec::len).sum();
        Ok(ImageOutcome {
            detections_in,
            merged: self.engine.fuse(&per_model),
            malformed,
            filtered,
        })
    }

    fn model_dirs(&self, video: &str) -> Vec<PathBuf> {
        self.models
            .iter()
            .map(|model| self.input_root.join(model).join(video))
            .collect()
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()?)
    }

    fn process_video(&self, video: &str) -> Result<VideoReport> {
        let images = self.discover_images(video)?;
        let out_dir = self.output_root.join(video);
        fs::create_dir_all(&out_dir).map_err(|e| VoteError::io(&out_dir, e))?;

        info!(video = %video, images = images.len(), "ensembling video");

        let model_dirs = self.model_dirs(video);
        let outcomes: Vec<(&String, Result<ImageOutcome>)> = images
            .par_iter()
            .map(|image| (image, self.process_image(&model_dirs, &out_dir, image)))
            .collect();

        let mut report = VideoReport {
            video: video.to_string(),
            ..VideoReport::default()
        };
        for (image, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    report.images += 1;
                    report.detections_in += outcome.detections_in;
                    report.merged_out += outcome.merged.len();
                    report.malformed_records += outcome.malformed;
                    report.filtered_records += outcome.filtered;
                    for merged in &outcome.merged {
                        *report.classes.entry(class_name(merged.class_id)).or_default() += 1;
                    }
                }
                Err(e) => {
                    warn!(video = %video, image = %image, error = %e, "image skipped");
                    report.failed_images.push(image.clone());
                }
            }
        }

        info!(
            video = %video,
            images = report.images,
            merged = report.merged_out,
            failed = report.failed_images.len(),
            "video done"
        );
        Ok(report)
    }

    fn process_image(
        &self,
        model_dirs: &[PathBuf],
        out_dir: &Path,
        image: &str,
    ) -> Result<ImageOutcome> {
        let sources: Vec<PathBuf> = model_dirs.iter().map(|dir| dir.join(image)).collect();
        let outcome = self.fuse_sources(&sources)?;
        write_labels(&out_dir.join(image), &outcome.merged)?;
        debug!(
            image = %image,
            detections = outcome.detections_in,
            merged = outcome.merged.len(),
            "image fused"
        );
        Ok(outcome)
    }
}

/// Merged label file contents, one line per detection.
pub fn render_labels(merged: &[MergedDetection]) -> String {
    let mut out = String::new();
    for detection in merged {
        out.push_str(&detection.to_string());
        out.push('\n');
    }
    out
}

/// Write a merged label file in one step, replacing any previous file.
pub fn write_labels(path: &Path, merged: &[MergedDetection]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| VoteError::io(dir, e))?;
    tmp.write_all(render_labels(merged).as_bytes())
        .map_err(|e| VoteError::io(tmp.path(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(LABEL_FILE_MODE))
            .map_err(|e| VoteError::io(tmp.path(), e))?;
    }
    tmp.persist(path).map_err(|e| VoteError::io(path, e.error))?;
    Ok(())
}
