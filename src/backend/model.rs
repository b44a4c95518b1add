//! Reconstructed model inspection.
//!
//! Statistics are read from the text export of a model (`cameras.txt`,
//! `images.txt`, `points3D.txt`). Counts come from the header comments the
//! exporter writes, falling back to counting records.

use std::path::{Path, PathBuf};

use crate::errors::PipelineError;
use crate::result::ModelStats;

/// One model produced by incremental mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateModel {
    /// Numeric directory name under the sparse directory
    pub index: usize,
    pub path: PathBuf,
    pub stats: ModelStats,
}

/// Pick the candidate with the most registered images.
///
/// Candidates are considered in slice order; on a tie the earlier one wins.
pub fn select_largest(candidates: &[CandidateModel]) -> Option<&CandidateModel> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if current.stats.num_images >= candidate.stats.num_images => Some(current),
        _ => Some(candidate),
    })
}

/// Numbered model directories under `sparse_dir`, in numeric order.
pub fn list_model_dirs(sparse_dir: &Path) -> Result<Vec<(usize, PathBuf)>, PipelineError> {
    if !sparse_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<(usize, PathBuf)> = std::fs::read_dir(sparse_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let index = entry.file_name().to_str()?.parse::<usize>().ok()?;
            Some((index, entry.path()))
        })
        .collect();
    dirs.sort_by_key(|(index, _)| *index);
    Ok(dirs)
}

/// Read statistics from a text-format model directory.
pub fn read_text_model(dir: &Path) -> Result<ModelStats, PipelineError> {
    let read = |name: &str| {
        let path = dir.join(name);
        std::fs::read_to_string(&path).map_err(|e| {
            PipelineError::collaborator(format!("Failed to read {}", path.display()), e)
        })
    };

    let cameras = read("cameras.txt")?;
    let images = read("images.txt")?;
    let points = read("points3D.txt")?;

    let (num_points, mean_reproj_error) = parse_points(&points);
    Ok(ModelStats {
        num_cameras: parse_cameras(&cameras),
        num_images: parse_images(&images),
        num_points,
        mean_reproj_error,
    })
}

fn header_count(content: &str, label: &str) -> Option<usize> {
    content
        .lines()
        .take_while(|line| line.starts_with('#'))
        .find_map(|line| {
            let rest = line.trim_start_matches('#').trim().strip_prefix(label)?;
            rest.split(',').next()?.trim().parse().ok()
        })
}

fn data_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

pub(crate) fn parse_cameras(content: &str) -> usize {
    header_count(content, "Number of cameras:").unwrap_or_else(|| data_lines(content).count())
}

/// Image records span two lines; the second (2D points) may be empty and
/// always holds a multiple of three values, so the record line is the one
/// with exactly ten fields.
pub(crate) fn parse_images(content: &str) -> usize {
    header_count(content, "Number of images:").unwrap_or_else(|| {
        data_lines(content)
            .filter(|line| line.split_whitespace().count() == 10)
            .count()
    })
}

/// Point count and the track-length-weighted mean reprojection error.
pub(crate) fn parse_points(content: &str) -> (usize, f64) {
    let mut count = 0usize;
    let mut weighted_error = 0.0f64;
    let mut observations = 0usize;

    for line in data_lines(content) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            continue;
        }
        count += 1;
        let Ok(error) = fields[7].parse::<f64>() else {
            continue;
        };
        let track_len = (fields.len() - 8) / 2;
        weighted_error += error * track_len as f64;
        observations += track_len;
    }

    let mean = if observations > 0 {
        weighted_error / observations as f64
    } else {
        0.0
    };
    (count, mean)
}
