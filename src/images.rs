//! Input image discovery.
//!
//! Only the top level of the image directory is scanned. Extensions are
//! matched case-insensitively against a fixed set.

use glob::{MatchOptions, Pattern, glob_with};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::errors::PipelineError;

/// Extensions accepted by the extraction stage.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// List the images in `dir`, sorted by path.
///
/// Fails with [`PipelineError::InvalidInput`] when `dir` is not a directory.
/// An existing directory without images yields an empty list; callers decide
/// whether that is an error.
pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::InvalidInput(format!(
            "image directory does not exist: {}",
            dir.display()
        )));
    }

    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let base = Pattern::escape(&dir.to_string_lossy());

    let mut images = BTreeSet::new();
    for ext in IMAGE_EXTENSIONS {
        let pattern = format!("{}/*.{}", base, ext);
        let entries = glob_with(&pattern, options)
            .map_err(|e| PipelineError::collaborator("Failed to read glob pattern", e))?;
        images.extend(
            entries
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file()),
        );
    }

    Ok(images.into_iter().collect())
}

/// Same as [`find_images`], but an empty directory is a
/// [`PipelineError::NoImagesFound`].
pub fn require_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let images = find_images(dir)?;
    if images.is_empty() {
        return Err(PipelineError::NoImagesFound {
            dir: dir.to_path_buf(),
        });
    }
    Ok(images)
}
