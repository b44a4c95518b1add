use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "sfm-runner")]
#[command(version, about = "Photogrammetry job orchestrator")]
pub struct Cli {
    /// Show per-line tool output and debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to sfm.toml. Defaults to ./sfm.toml, then the user config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconstruct a sparse model from a directory of images
    Run(RunArgs),
    /// List the images the extraction stage would accept
    Images {
        /// Image directory to scan
        dir: PathBuf,

        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },
    /// View, validate or create sfm.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Directory containing the input images
    pub image_dir: PathBuf,

    /// Output directory (default: a new temporary directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Camera model, e.g. OPENCV, PINHOLE, SIMPLE_RADIAL
    #[arg(long)]
    pub camera_model: Option<String>,

    /// Camera grouping: AUTO, SINGLE, PER_FOLDER or PER_IMAGE
    #[arg(long)]
    pub camera_mode: Option<String>,

    /// Matching strategy: exhaustive, sequential, vocab_tree or spatial
    #[arg(long)]
    pub match_type: Option<String>,

    /// Longest image side used for feature extraction
    #[arg(long)]
    pub max_image_size: Option<u32>,

    /// Maximum number of features per image
    #[arg(long)]
    pub max_features: Option<u32>,

    /// Vocabulary tree for the vocab_tree matcher
    #[arg(long)]
    pub vocab_tree: Option<PathBuf>,

    /// Stop after reconstruction without writing undistorted images
    #[arg(long)]
    pub no_undistort: bool,

    /// Backend executable (overrides COLMAP_CMD and sfm.toml)
    #[arg(long)]
    pub program: Option<String>,

    /// Cancel the job once this many seconds have elapsed
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the run record as JSON instead of progress bars
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
    Init,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Run(args) => cmd::cmd_run(&cli, args)?,
        Commands::Images { dir, json } => cmd::cmd_images(dir, *json)?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
