//! Image listing: `sfm-runner images <dir>`.

use anyhow::{Context, Result};
use std::path::Path;

pub fn cmd_images(dir: &Path, json: bool) -> Result<()> {
    use sfm_runner::images::{IMAGE_EXTENSIONS, find_images};

    let images = find_images(dir)?;

    if json {
        let content =
            serde_json::to_string_pretty(&images).context("Failed to serialize image list")?;
        println!("{}", content);
        return Ok(());
    }

    if images.is_empty() {
        println!(
            "No images found in {} (accepted extensions: {})",
            dir.display(),
            IMAGE_EXTENSIONS.join(", ")
        );
        return Ok(());
    }

    for image in &images {
        println!("{}", image.display());
    }
    println!();
    println!("{} images", images.len());
    Ok(())
}
