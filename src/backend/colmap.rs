//! Backend driving the `colmap` command-line executable.
//!
//! Each stage maps onto one or more subcommands. Output is streamed while the
//! process runs: recognised progress lines feed the stage's progress sink and
//! the last lines of stderr are kept for the error message if it exits
//! non-zero.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use tracing::{debug, warn};

use super::database::FeatureDb;
use super::model::{CandidateModel, list_model_dirs, read_text_model, select_largest};
use super::{Backend, StageProgress};
use crate::config::ReconstructionConfig;
use crate::errors::PipelineError;
use crate::images::require_images;
use crate::options::{CameraMode, MatchStrategy};
use crate::result::ReconstructionResult;

/// Default executable name, resolved through `PATH`.
pub const DEFAULT_PROGRAM: &str = "colmap";

/// Number of stderr lines quoted in a failure message.
const STDERR_TAIL_LINES: usize = 20;

static PROCESSED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Processed file|Matching image|Matching block|Undistorting image) \[(\d+)/(\d+)")
        .unwrap()
});

static REGISTERING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Registering image #\d+ \((\d+)\)").unwrap());

/// Extract `(current, total)` from one line of tool output.
///
/// The mapper only reports how many images it has registered so far, so its
/// lines need `total_hint` (the number of images in the database).
pub(crate) fn parse_progress(line: &str, total_hint: Option<u64>) -> Option<(u64, u64)> {
    if let Some(caps) = PROCESSED_REGEX.captures(line) {
        let current = caps[1].parse().ok()?;
        let total = caps[2].parse().ok()?;
        return Some((current, total));
    }
    if let Some(total) = total_hint
        && let Some(caps) = REGISTERING_REGEX.captures(line)
    {
        let current: u64 = caps[1].parse().ok()?;
        return Some((current.min(total), total));
    }
    None
}

/// Runs stages through the `colmap` executable.
#[derive(Debug, Clone)]
pub struct ColmapCli {
    program: String,
}

impl Default for ColmapCli {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl ColmapCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run one subcommand to completion.
    fn run(
        &self,
        subcommand: &str,
        args: &[OsString],
        progress: StageProgress<'_>,
        total_hint: Option<u64>,
    ) -> Result<(), PipelineError> {
        debug!(
            program = %self.program,
            subcommand,
            args = ?args,
            "Launching colmap"
        );
        let started = Instant::now();

        let mut child = Command::new(&self.program)
            .arg(subcommand)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PipelineError::collaborator(
                    format!("Failed to launch {} {}", self.program, subcommand),
                    e,
                )
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let drained = std::thread::scope(|scope| {
            let err_reader = scope.spawn(move || match stderr {
                Some(stream) => drain(stream, subcommand, progress, total_hint, STDERR_TAIL_LINES),
                None => VecDeque::new(),
            });
            if let Some(stream) = stdout {
                drain(stream, subcommand, progress, total_hint, 0);
            }
            err_reader.join()
        });

        let status = child.wait().map_err(|e| {
            PipelineError::collaborator(format!("Failed to wait for {}", subcommand), e)
        })?;
        let tail = drained.map_err(|_| {
            PipelineError::Collaborator(format!("{} output reader panicked", subcommand))
        })?;

        debug!(
            subcommand,
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = %status,
            "colmap finished"
        );

        if status.success() {
            return Ok(());
        }

        let code = match status.code() {
            Some(code) => format!("exit code {}", code),
            None => "a signal".to_string(),
        };
        let tail: Vec<String> = tail.into_iter().collect();
        let mut message = format!("colmap {} failed with {}", subcommand, code);
        if !tail.is_empty() {
            message.push_str(": ");
            message.push_str(&tail.join("\n"));
        }
        Err(PipelineError::Collaborator(message))
    }
}

/// Read a stream line by line, forwarding progress and keeping the last
/// `keep` lines.
fn drain(
    stream: impl Read,
    subcommand: &str,
    progress: StageProgress<'_>,
    total_hint: Option<u64>,
    keep: usize,
) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(keep);
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else {
            break;
        };
        if let Some((current, total)) = parse_progress(&line, total_hint) {
            progress(current, total, &line);
        }
        debug!(target: "sfm_runner::colmap", "[{}] {}", subcommand, line);
        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
    tail
}

fn flag(args: &mut Vec<OsString>, name: &str, value: impl Into<OsString>) {
    args.push(name.into());
    args.push(value.into());
}

fn path_flag(args: &mut Vec<OsString>, name: &str, value: &Path) {
    flag(args, name, value.as_os_str().to_os_string());
}

/// Move the model at `chosen` into `target`, swapping with whatever is there.
fn promote_model(chosen: &Path, target: &Path) -> Result<(), PipelineError> {
    if chosen == target {
        return Ok(());
    }
    if target.exists() {
        let parking = target.with_file_name(".swap");
        if parking.exists() {
            debug!(path = %parking.display(), "Removing stale swap directory");
            std::fs::remove_dir_all(&parking)?;
        }
        std::fs::rename(target, &parking)?;
        std::fs::rename(chosen, target)?;
        std::fs::rename(&parking, chosen)?;
    } else {
        std::fs::rename(chosen, target)?;
    }
    Ok(())
}

impl Backend for ColmapCli {
    fn extract(
        &self,
        config: &ReconstructionConfig,
        progress: StageProgress<'_>,
    ) -> Result<usize, PipelineError> {
        let images = require_images(config.image_dir())?;
        progress(0, images.len() as u64, "Starting feature extraction...");

        let mut args = Vec::new();
        path_flag(&mut args, "--database_path", &config.database_path());
        path_flag(&mut args, "--image_path", config.image_dir());
        flag(&mut args, "--ImageReader.camera_model", config.camera_model());
        match config.camera_mode() {
            CameraMode::Auto => {}
            CameraMode::Single => flag(&mut args, "--ImageReader.single_camera", "1"),
            CameraMode::PerFolder => {
                flag(&mut args, "--ImageReader.single_camera_per_folder", "1")
            }
            CameraMode::PerImage => flag(&mut args, "--ImageReader.single_camera_per_image", "1"),
        }
        flag(
            &mut args,
            "--SiftExtraction.max_image_size",
            config.max_image_size().to_string(),
        );
        flag(
            &mut args,
            "--SiftExtraction.max_num_features",
            config.max_num_features().to_string(),
        );

        self.run("feature_extractor", &args, progress, None)?;

        match FeatureDb::open(&config.database_path()).and_then(|db| db.image_count()) {
            Ok(count) => Ok(count as usize),
            Err(e) => {
                warn!(error = %e, "Could not read image count, using directory listing");
                Ok(images.len())
            }
        }
    }

    fn match_features(
        &self,
        config: &ReconstructionConfig,
        progress: StageProgress<'_>,
    ) -> Result<u64, PipelineError> {
        let strategy: MatchStrategy = config.match_type().parse()?;

        let mut args = Vec::new();
        path_flag(&mut args, "--database_path", &config.database_path());
        if strategy == MatchStrategy::VocabTree
            && let Some(tree) = config.vocab_tree_path()
        {
            path_flag(&mut args, "--VocabTreeMatching.vocab_tree_path", tree);
        }

        self.run(&format!("{}_matcher", strategy.as_str()), &args, progress, None)?;

        let db = FeatureDb::open(&config.database_path())?;
        let matches = db.match_count()?;
        debug!(
            matches,
            verified_pairs = db.verified_pair_count().unwrap_or(0),
            "Matching finished"
        );
        Ok(matches)
    }

    fn reconstruct(
        &self,
        config: &ReconstructionConfig,
        progress: StageProgress<'_>,
    ) -> Result<ReconstructionResult, PipelineError> {
        let sparse = config.sparse_path();
        std::fs::create_dir_all(&sparse)?;
        progress(0, 100, "Starting incremental mapping...");

        let total = FeatureDb::open(&config.database_path())
            .and_then(|db| db.image_count())
            .ok();

        let mut args = Vec::new();
        path_flag(&mut args, "--database_path", &config.database_path());
        path_flag(&mut args, "--image_path", config.image_dir());
        path_flag(&mut args, "--output_path", &sparse);
        self.run("mapper", &args, progress, total)?;

        let mut candidates = Vec::new();
        for (index, path) in list_model_dirs(&sparse)? {
            let mut convert = Vec::new();
            path_flag(&mut convert, "--input_path", &path);
            path_flag(&mut convert, "--output_path", &path);
            flag(&mut convert, "--output_type", "TXT");
            if let Err(e) = self.run("model_converter", &convert, &super::no_progress, None) {
                warn!(index, error = %e, "Skipping model that could not be converted");
                continue;
            }

            match read_text_model(&path) {
                Ok(stats) if stats.num_images > 0 => {
                    candidates.push(CandidateModel { index, path, stats })
                }
                Ok(_) => debug!(index, "Skipping empty model"),
                Err(e) => warn!(index, error = %e, "Skipping unreadable model"),
            }
        }

        let Some(best) = select_largest(&candidates).cloned() else {
            return Ok(ReconstructionResult::failure(
                PipelineError::NoValidReconstruction.to_string(),
            ));
        };

        let model_path = config.model_path();
        promote_model(&best.path, &model_path)?;

        let mut result = ReconstructionResult::success(model_path, best.stats);
        if candidates.len() > 1 {
            result.warnings.push(format!(
                "Mapper produced {} models; kept model {} with {} images",
                candidates.len(),
                best.index,
                best.stats.num_images
            ));
        }
        progress(
            100,
            100,
            &format!("Reconstruction complete: {} images", best.stats.num_images),
        );
        Ok(result)
    }

    fn undistort(
        &self,
        config: &ReconstructionConfig,
        progress: StageProgress<'_>,
    ) -> Result<(), PipelineError> {
        let model_path = config.model_path();
        if !model_path.is_dir() {
            return Err(PipelineError::Collaborator(format!(
                "No reconstructed model at {}",
                model_path.display()
            )));
        }
        let output = config.undistorted_path();
        std::fs::create_dir_all(&output)?;
        progress(0, 100, "Undistorting images...");

        let mut args = Vec::new();
        path_flag(&mut args, "--image_path", config.image_dir());
        path_flag(&mut args, "--input_path", &model_path);
        path_flag(&mut args, "--output_path", &output);
        flag(&mut args, "--output_type", "COLMAP");
        self.run("image_undistorter", &args, progress, None)?;

        progress(100, 100, "Undistortion complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_progress_processed_file() {
        assert_eq!(
            parse_progress("I0101 12:00:00 Processed file [3/12]", None),
            Some((3, 12))
        );
        assert_eq!(
            parse_progress("Matching block [2/5, 1/5]", None),
            Some((2, 5))
        );
    }

    #[test]
    fn test_parse_progress_registering_needs_total() {
        let line = "Registering image #17 (4)";
        assert_eq!(parse_progress(line, None), None);
        assert_eq!(parse_progress(line, Some(10)), Some((4, 10)));
        assert_eq!(parse_progress("Registering image #2 (40)", Some(10)), Some((10, 10)));
    }

    #[test]
    fn test_parse_progress_ignores_other_lines() {
        assert_eq!(parse_progress("Elapsed time: 0.012 [minutes]", Some(5)), None);
    }

    #[test]
    fn test_missing_program_is_collaborator_error() {
        let cli = ColmapCli::new("sfm-runner-no-such-program");
        let err = cli
            .run("feature_extractor", &[], &crate::backend::no_progress, None)
            .unwrap_err();
        assert!(err.to_string().contains("Failed to launch"));
    }

    #[test]
    fn test_extract_checks_images_before_launching() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        let config =
            ReconstructionConfig::with_defaults(&images, Some(dir.path().join("out"))).unwrap();
        let cli = ColmapCli::new("sfm-runner-no-such-program");
        let err = cli.extract(&config, &crate::backend::no_progress).unwrap_err();
        assert!(matches!(err, PipelineError::NoImagesFound { .. }));
    }

    #[test]
    fn test_match_rejects_unknown_strategy_before_launching() {
        let dir = tempdir().unwrap();
        let options = crate::config::PipelineOptions {
            match_type: "transitive".into(),
            ..Default::default()
        };
        let config =
            ReconstructionConfig::new(dir.path(), Some(dir.path().join("out")), options).unwrap();
        let cli = ColmapCli::new("sfm-runner-no-such-program");
        let err = cli
            .match_features(&config, &crate::backend::no_progress)
            .unwrap_err();
        assert_eq!(err, PipelineError::UnknownMatchStrategy("transitive".into()));
    }

    #[test]
    fn test_undistort_requires_model() {
        let dir = tempdir().unwrap();
        let config =
            ReconstructionConfig::with_defaults(dir.path(), Some(dir.path().join("out"))).unwrap();
        let err = ColmapCli::default()
            .undistort(&config, &crate::backend::no_progress)
            .unwrap_err();
        assert!(err.to_string().contains("No reconstructed model"));
    }

    #[test]
    fn test_promote_model_swaps_directories() {
        let dir = tempdir().unwrap();
        let zero = dir.path().join("0");
        let two = dir.path().join("2");
        std::fs::create_dir(&zero).unwrap();
        std::fs::create_dir(&two).unwrap();
        std::fs::write(zero.join("marker"), "small").unwrap();
        std::fs::write(two.join("marker"), "large").unwrap();

        promote_model(&two, &zero).unwrap();
        assert_eq!(std::fs::read_to_string(zero.join("marker")).unwrap(), "large");
        assert_eq!(std::fs::read_to_string(two.join("marker")).unwrap(), "small");
        assert!(!dir.path().join(".swap").exists());
    }

    #[test]
    fn test_promote_model_replaces_stale_swap_directory() {
        let dir = tempdir().unwrap();
        let zero = dir.path().join("0");
        let one = dir.path().join("1");
        let stale = dir.path().join(".swap");
        for path in [&zero, &one, &stale] {
            std::fs::create_dir(path).unwrap();
        }
        std::fs::write(zero.join("marker"), "small").unwrap();
        std::fs::write(one.join("marker"), "large").unwrap();
        std::fs::write(stale.join("cameras.txt"), "left over").unwrap();

        promote_model(&one, &zero).unwrap();
        assert_eq!(std::fs::read_to_string(zero.join("marker")).unwrap(), "large");
        assert_eq!(std::fs::read_to_string(one.join("marker")).unwrap(), "small");
        assert!(!stale.exists());
    }

    /// Write an executable script standing in for colmap.
    #[cfg(unix)]
    fn fake_program(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-colmap");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_reconstruct_skips_models_that_fail_conversion() {
        let dir = tempdir().unwrap();
        let program = fake_program(
            dir.path(),
            r#"if [ "$1" = "model_converter" ]; then echo "bad model" >&2; exit 1; fi"#,
        );
        let config =
            ReconstructionConfig::with_defaults(dir.path(), Some(dir.path().join("out"))).unwrap();
        std::fs::create_dir_all(config.sparse_path().join("0")).unwrap();
        std::fs::create_dir_all(config.sparse_path().join("1")).unwrap();

        let cli = ColmapCli::new(program.to_string_lossy());
        let result = cli
            .reconstruct(&config, &crate::backend::no_progress)
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No valid reconstructions found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_reports_code_and_stderr_tail() {
        let cli = ColmapCli::new("sh");
        let args: Vec<OsString> = vec!["echo 'Processed file [1/2]'; echo boom >&2; exit 3".into()];
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |current: u64, total: u64, _: &str| seen.lock().unwrap().push((current, total));
        let err = cli.run("-c", &args, &sink, None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit code 3"), "{}", message);
        assert!(message.contains("boom"), "{}", message);
        assert_eq!(seen.lock().unwrap().as_slice(), &[(1, 2)]);
    }
}
