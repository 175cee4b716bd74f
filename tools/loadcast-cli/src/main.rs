//! Loadcast CLI: record page-load videos and compare them.
//!
//! Usage:
//!   loadcast record [OPTIONS] <URL> <VIDEO_FILE>    Record a page loading into a video
//!   loadcast juxtapose -o <OUTPUT> <INPUTS>...      Stack videos side by side

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "loadcast",
    about = "Turn a web page loading into a shareable video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the loading of a URL into a video file
    Record {
        /// Merge show spec values from a YAML file
        #[arg(short, long, value_name = "PATH")]
        merge: Option<PathBuf>,

        /// Update a single spec value (repeatable), e.g. -u layout.columns=4
        #[arg(short, long = "update", value_name = "KEY=VALUE")]
        update: Vec<String>,

        /// Keep artifacts in this directory instead of a temp dir
        #[arg(short, long, value_name = "DIR")]
        artifacts: Option<PathBuf>,

        /// URL to record
        url: String,

        /// Output video file path
        video_file: PathBuf,
    },

    /// Juxtapose multiple videos into one to compare
    Juxtapose {
        /// Output video file path
        #[arg(short, long)]
        output: PathBuf,

        /// Input video file paths (at least 2)
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    loadcast_common::logging::init_logging(&loadcast_common::logging::LoggingConfig {
        level: log_level.to_string(),
        json: false,
    });

    match cli.command {
        Commands::Record {
            merge,
            update,
            artifacts,
            url,
            video_file,
        } => commands::record::run(merge, update, artifacts, url, video_file).await,
        Commands::Juxtapose { output, inputs } => commands::juxtapose::run(output, inputs).await,
    }
}
