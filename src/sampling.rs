//! Golden-set sampling: a random handful of frames per video for manual review.

use crate::error::{Result, VoteError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_SAMPLES_PER_VIDEO: usize = 20;

const FRAME_EXTENSION: &str = ".jpg";

/// Copy up to `count` randomly chosen frames of every video under
/// `frames_root` into `<dest>/<video>/`.
///
/// Returns the number of frames copied per video. Videos without frames are
/// left out. Passing a seed makes the selection reproducible.
pub fn sample_frames(
    frames_root: &Path,
    dest: &Path,
    count: usize,
    seed: Option<u64>,
) -> Result<BTreeMap<String, usize>> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    fs::create_dir_all(dest).map_err(|e| VoteError::io(dest, e))?;

    let mut copied = BTreeMap::new();
    for video in sorted_subdirectories(frames_root)? {
        let video_dir = frames_root.join(&video);
        let frames = sorted_frames(&video_dir)?;
        if frames.is_empty() {
            debug!(video = %video, "no frames, skipping");
            continue;
        }

        let mut chosen: Vec<&String> = frames.choose_multiple(&mut rng, count).collect();
        chosen.sort();

        let out_dir = dest.join(&video);
        fs::create_dir_all(&out_dir).map_err(|e| VoteError::io(&out_dir, e))?;
        for frame in &chosen {
            let target = out_dir.join(frame);
            fs::copy(video_dir.join(frame), &target).map_err(|e| VoteError::io(&target, e))?;
        }

        info!(video = %video, sampled = chosen.len(), available = frames.len(), "sampled frames");
        copied.insert(video, chosen.len());
    }

    Ok(copied)
}

fn sorted_subdirectories(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| VoteError::io(root, e))? {
        let entry = entry.map_err(|e| VoteError::io(root, e))?;
        if entry.path().is_dir()
            && let Some(name) = entry.file_name().to_str()
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn sorted_frames(dir: &Path) -> Result<Vec<String>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| VoteError::io(dir, e))? {
        let entry = entry.map_err(|e| VoteError::io(dir, e))?;
        if let Some(name) = entry.file_name().to_str()
            && name.ends_with(FRAME_EXTENSION)
            && entry.path().is_file()
        {
            frames.push(name.to_string());
        }
    }
    frames.sort();
    Ok(frames)
}
