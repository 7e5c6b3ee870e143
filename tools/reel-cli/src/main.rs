//! CommentReel CLI: turn a batch of comments into one narrated video.
//!
//! Usage:
//!   reel run --records FILE     Run every enabled stage for a batch
//!   reel record ...             Record one visual
//!   reel probe <FILE>           Measure an audio file
//!   reel mux ...                Put narration on a recording
//!   reel concat --dir D ...     Concatenate combined clips
//!   reel metadata --dir D       Write metadata.json for a directory
//!   reel check                  Check external tools and display

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reel_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "reel",
    about = "Narrated comment videos from rendered visuals and synthesized speech",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/commentreel/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline for a batch of records
    Run {
        /// JSON array of records
        #[arg(short, long)]
        records: PathBuf,

        /// Directory in which the output_<timestamp> work directory is created
        #[arg(short, long, default_value = ".")]
        output_parent: PathBuf,

        /// Folder of rendered comment_NNNN.html visuals
        #[arg(long)]
        visuals: Option<PathBuf>,
    },

    /// Record a single visual to a video file
    Record {
        /// Local HTML file or http(s) URL
        #[arg(long)]
        visual: String,

        /// Output video file
        #[arg(short, long)]
        output: PathBuf,

        /// Recording duration (seconds)
        #[arg(long)]
        duration: f64,

        /// Capture frame rate (defaults to the configured rate)
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Measure the duration of an audio file
    Probe {
        /// Audio file
        path: PathBuf,

        /// Re-encode attempts (defaults to the configured count)
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Mux narration onto a recording with the fixed lead-in
    Mux {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        audio: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Concatenate every combined clip in a directory
    Concat {
        #[arg(long)]
        dir: PathBuf,

        /// Output file (defaults to output.<ext> inside the directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write metadata.json for a directory
    Metadata {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Check external tools and the display server
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref());
    reel_common::logging::init_logging(&config.logging.clone().with_verbosity(cli.verbose));
    tracing::debug!(config = ?cli.config, "Configuration loaded");

    match cli.command {
        Commands::Run {
            records,
            output_parent,
            visuals,
        } => commands::run::run(config, records, output_parent, visuals).await,
        Commands::Record {
            visual,
            output,
            duration,
            fps,
        } => commands::record::run(&config, visual, output, duration, fps).await,
        Commands::Probe { path, retries } => commands::probe::run(&config, path, retries).await,
        Commands::Mux {
            video,
            audio,
            output,
        } => commands::mux::run(&config, video, audio, output).await,
        Commands::Concat { dir, output } => commands::concat::run(&config, dir, output).await,
        Commands::Metadata { dir } => commands::metadata::run(&config, dir).await,
        Commands::Check => commands::check::run(&config),
    }
}
