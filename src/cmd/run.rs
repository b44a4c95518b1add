//! Reconstruction run: `sfm-runner run <images>`.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::super::{Cli, RunArgs};
use sfm_runner::config::PipelineOptions;

/// How often the event loop wakes up to check the time limit.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Apply command-line overrides on top of the file defaults.
fn apply_overrides(args: &RunArgs, mut options: PipelineOptions) -> Result<PipelineOptions> {
    use sfm_runner::options::{CameraMode, is_known_camera_model};

    if let Some(mode) = &args.camera_mode {
        options.camera_mode = mode.parse::<CameraMode>()?;
    }
    if let Some(model) = &args.camera_model {
        if !is_known_camera_model(model) {
            warn!(camera_model = %model, "Unknown camera model, passing it through");
        }
        options.camera_model = model.clone();
    }
    if let Some(match_type) = &args.match_type {
        options.match_type = match_type.clone();
    }
    if let Some(size) = args.max_image_size {
        options.max_image_size = size;
    }
    if let Some(features) = args.max_features {
        options.max_num_features = features;
    }
    if let Some(tree) = &args.vocab_tree {
        options.vocab_tree_path = Some(tree.clone());
    }
    if args.no_undistort {
        options.undistort = false;
    }
    Ok(options)
}

pub fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<()> {
    use sfm_runner::audit::{RunConfig, RunRecord};
    use sfm_runner::backend::ColmapCli;
    use sfm_runner::config::ReconstructionConfig;
    use sfm_runner::orchestrator::Job;
    use sfm_runner::settings::Settings;
    use sfm_runner::stage::Stage;
    use sfm_runner::ui::JobProgressUI;

    let (settings, source) = Settings::load_or_default(cli.config.as_deref())?;
    if let Some(path) = &source {
        debug!(path = %path.display(), "Loaded settings");
    }
    for warning in settings.validate() {
        warn!("{}", warning);
    }

    let options = apply_overrides(args, settings.defaults.clone())?;
    let program = args.program.clone().unwrap_or_else(|| settings.program());

    let config = ReconstructionConfig::new(&args.image_dir, args.output.clone(), options)
        .context("Invalid job configuration")?;
    let job = Job::builder(config)
        .backend(Arc::new(ColmapCli::new(program.as_str())))
        .build();
    let events = job.subscribe();

    let mut record = RunRecord::new(RunConfig::from_config(job.config(), &program));
    let mut ui = JobProgressUI::new(cli.verbose, args.json);
    let limit = args.timeout.map(Duration::from_secs);
    let started = Instant::now();
    let mut cancelled_for_time = false;

    job.start()?;

    loop {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                record.observe(&event);
                ui.handle(&event);
                if event.is_terminal() {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if !cancelled_for_time
            && let Some(limit) = limit
            && started.elapsed() >= limit
        {
            cancelled_for_time = true;
            ui.show_timeout(limit);
            job.cancel();
        }
    }

    job.wait(None);
    let snapshot = job.snapshot();
    record.finish();
    let record_path = record.save(job.config().output_dir())?;
    debug!(path = %record_path.display(), "Run record written");

    if args.json {
        let content =
            serde_json::to_string_pretty(&record).context("Failed to serialize run record")?;
        println!("{}", content);
    }

    match snapshot.stage {
        Stage::Done => {
            if !args.json {
                println!();
                println!("Output: {}", job.config().output_dir().display());
            }
            Ok(())
        }
        Stage::Cancelled => anyhow::bail!(
            "Reconstruction cancelled at {:.0}%",
            snapshot.progress
        ),
        _ => anyhow::bail!("Reconstruction failed: {}", snapshot.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> RunArgs {
        let cli = Cli::parse_from(argv);
        match cli.command {
            super::super::super::Commands::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let args = parse(&[
            "sfm-runner",
            "run",
            "images",
            "--camera-mode",
            "single",
            "--camera-model",
            "PINHOLE",
            "--match-type",
            "sequential",
            "--max-image-size",
            "1600",
            "--no-undistort",
        ]);
        let options = apply_overrides(&args, PipelineOptions::default()).unwrap();
        assert_eq!(options.camera_mode.to_string(), "SINGLE");
        assert_eq!(options.camera_model, "PINHOLE");
        assert_eq!(options.match_type, "sequential");
        assert_eq!(options.max_image_size, 1600);
        assert_eq!(options.max_num_features, 8192);
        assert!(!options.undistort);
    }

    #[test]
    fn test_invalid_camera_mode_is_rejected() {
        let args = parse(&["sfm-runner", "run", "images", "--camera-mode", "sometimes"]);
        let err = apply_overrides(&args, PipelineOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid camera mode"));
    }
}
