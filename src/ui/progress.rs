use crate::orchestrator::JobEvent;
use crate::result::ReconstructionResult;
use crate::stage::Stage;
use crate::ui::icons::{CAMERA, CHECK, CLOCK, CROSS, FOLDER, POINTS, STOP, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a reconstruction job, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Overall bar - job percentage from 0 to 100
/// - Stage bar - spinner with the current stage and its latest status line
pub struct JobProgressUI {
    multi: MultiProgress,
    overall_bar: ProgressBar,
    stage_bar: ProgressBar,
    verbose: bool,
    current: Stage,
}

impl JobProgressUI {
    /// Create the UI. When `hidden`, nothing is drawn (used for `--json`).
    pub fn new(verbose: bool, hidden: bool) -> Self {
        let multi = if hidden {
            MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };

        let overall_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let overall_bar = multi.add(ProgressBar::new(100));
        overall_bar.set_style(overall_style);
        overall_bar.set_prefix("  Job");

        let stage_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let stage_bar = multi.add(ProgressBar::new_spinner());
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stage");

        Self {
            multi,
            overall_bar,
            stage_bar,
            verbose,
            current: Stage::Idle,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Render one job event.
    pub fn handle(&mut self, event: &JobEvent) {
        match event {
            JobEvent::Progress {
                stage,
                percent,
                message,
            } => self.update(*stage, *percent, message),
            JobEvent::Completed(result) => self.finish_success(result),
            JobEvent::Failed { message, .. } => self.finish_error(message),
            JobEvent::Cancelled { percent } => self.finish_cancelled(*percent),
        }
    }

    fn update(&mut self, stage: Stage, percent: f64, message: &str) {
        if stage != self.current {
            if self.current.is_running() {
                self.print_line(format!("  {} {}", CHECK, style(self.current).green()));
            }
            self.current = stage;
            self.stage_bar
                .enable_steady_tick(Duration::from_millis(100));
        }
        self.overall_bar.set_position(percent.round() as u64);
        self.overall_bar.set_message(format!("{}", style(stage).yellow()));
        self.stage_bar.set_message(message.to_string());
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(message).dim()));
        }
    }

    fn finish_success(&mut self, result: &ReconstructionResult) {
        self.print_line(format!("  {} {}", CHECK, style(self.current).green()));
        self.overall_bar.set_position(100);
        self.overall_bar
            .finish_with_message(format!("{}", style("done").green().bold()));
        self.stage_bar
            .finish_with_message(format!("{} Reconstruction complete", CHECK));
        for line in summary_lines(result) {
            self.print_line(line);
        }
        self.current = Stage::Done;
    }

    fn finish_error(&mut self, message: &str) {
        self.overall_bar
            .abandon_with_message(format!("{}", style("failed").red().bold()));
        self.stage_bar
            .abandon_with_message(format!("{} {} failed: {}", CROSS, self.current, message));
        self.current = Stage::Error;
    }

    fn finish_cancelled(&mut self, percent: f64) {
        self.overall_bar
            .abandon_with_message(format!("{}", style("cancelled").yellow().bold()));
        self.stage_bar.abandon_with_message(format!(
            "{} Cancelled at {:.0}%",
            STOP, percent
        ));
        self.current = Stage::Cancelled;
    }

    /// Report that the wait for the job exceeded its time limit.
    pub fn show_timeout(&self, limit: Duration) {
        self.print_line(format!(
            "  {} Time limit of {}s reached, cancelling at the next stage boundary",
            CLOCK,
            limit.as_secs()
        ));
    }
}

/// Human-readable summary of a successful result.
pub fn summary_lines(result: &ReconstructionResult) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(path) = &result.sparse_path {
        lines.push(format!("  {} Sparse model: {}", FOLDER, path.display()));
    }
    if let Some(path) = &result.undistorted_path {
        lines.push(format!("  {} Undistorted images: {}", FOLDER, path.display()));
    }
    lines.push(format!(
        "  {} {} cameras, {} images registered",
        CAMERA, result.num_cameras, result.num_images
    ));
    lines.push(format!(
        "  {} {} points, mean reprojection error {:.3} px",
        POINTS, result.num_points, result.mean_reproj_error
    ));
    for warning in &result.warnings {
        lines.push(format!("  {} {}", WARN, warning));
    }
    lines
}
