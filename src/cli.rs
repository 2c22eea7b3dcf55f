//! Command-line interface for visionloop
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::StatusTarget;

/// Real-time frame classification with best-effort reporting
#[derive(Parser, Debug)]
#[command(
    name = "visionloop",
    version,
    about = "Real-time frame classification with best-effort reporting"
)]
pub struct Cli {
    /// Subcommand to execute (default: run the live pipeline)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// ONNX model file
    #[arg(long, global = true, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Labels file (one class name per line)
    #[arg(long, global = true, value_name = "PATH")]
    pub labels: Option<PathBuf>,

    /// Minimum probability for a prediction (0.0-1.0)
    #[arg(long, global = true, value_name = "P")]
    pub threshold: Option<f32>,

    /// Model input width in pixels
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,

    /// Model input height in pixels
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,

    /// Replay this image instead of the synthetic camera
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Report endpoint URL
    #[arg(long, value_name = "URL")]
    pub report_endpoint: Option<String>,

    /// Disable prediction reporting
    #[arg(long)]
    pub no_report: bool,

    /// Where to show status text (stdout, stderr, log)
    #[arg(long, value_name = "TARGET")]
    pub status: Option<StatusTarget>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a single image and print the result
    Classify {
        /// Image file to classify
        image: PathBuf,

        /// Also submit the prediction to the report endpoint
        #[arg(long)]
        report: bool,
    },

    /// Manage configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment)
    Show,
    /// Print the configuration file path
    Path,
}
