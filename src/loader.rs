//! Per-model detection files.
//!
//! One file per (model, image), one record per line:
//! `class_id confidence x1 y1 x2 y2`. Records that cannot be used are skipped
//! rather than failing the image; only an unreadable file is an error.

use crate::error::{Result, VoteError};
use boxvote_core::{BoundingBox, Detection};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::debug;

const FIELDS_PER_RECORD: usize = 6;

/// Detections read from one source plus counts of what was dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutcome {
    pub detections: Vec<Detection>,
    /// Lines that are not UTF-8, have the wrong shape, or carry an invalid
    /// number or box
    pub malformed: usize,
    /// Well-formed lines whose class is outside the allowed set
    pub filtered: usize,
}

enum Record {
    Kept(Detection),
    Filtered,
    Malformed(&'static str),
}

/// Load one model's detections for one image.
///
/// A missing file means the model produced nothing for that image and
/// yields an empty outcome.
pub fn load_detections(path: &Path, allowed: &BTreeSet<u32>) -> Result<LoadOutcome> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LoadOutcome::default()),
        Err(e) => return Err(VoteError::io(path, e)),
    };

    let outcome =
        parse_detections(BufReader::new(file), allowed).map_err(|e| VoteError::io(path, e))?;
    if outcome.malformed > 0 {
        debug!(
            path = %path.display(),
            malformed = outcome.malformed,
            "skipped malformed detection records"
        );
    }
    Ok(outcome)
}

pub fn parse_detections<R: BufRead>(
    mut reader: R,
    allowed: &BTreeSet<u32>,
) -> io::Result<LoadOutcome> {
    let mut outcome = LoadOutcome::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;

        let record = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => parse_record(line, allowed),
            Err(_) => Record::Malformed("not valid UTF-8"),
        };
        match record {
            Record::Kept(detection) => outcome.detections.push(detection),
            Record::Filtered => outcome.filtered += 1,
            Record::Malformed(reason) => {
                debug!(line = line_no, reason, "malformed record");
                outcome.malformed += 1;
            }
        }
    }

    Ok(outcome)
}

fn parse_record(line: &str, allowed: &BTreeSet<u32>) -> Record {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != FIELDS_PER_RECORD {
        return Record::Malformed("expected 6 fields");
    }

    let Ok(class_id) = fields[0].parse::<i64>() else {
        return Record::Malformed("class id is not an integer");
    };
    let class_id = match u32::try_from(class_id) {
        Ok(id) if allowed.contains(&id) => id,
        _ => return Record::Filtered,
    };

    let mut numbers = [0.0f64; 5];
    for (slot, field) in numbers.iter_mut().zip(&fields[1..]) {
        match field.parse::<f64>() {
            Ok(value) => *slot = value,
            Err(_) => return Record::Malformed("non-numeric field"),
        }
    }
    let [confidence, x1, y1, x2, y2] = numbers;
    if !(0.0..=1.0).contains(&confidence) {
        return Record::Malformed("confidence outside [0, 1]");
    }

    match BoundingBox::try_new(x1, y1, x2, y2) {
        Ok(bbox) => Record::Kept(Detection::new(class_id, confidence, bbox)),
        Err(_) => Record::Malformed("invalid box"),
    }
}
