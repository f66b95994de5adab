//! CLI parse: clap types for animatr. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// animatr - production orchestration inspection tool
#[derive(Parser)]
#[command(name = "animatr")]
#[command(about = "Inspect how production inputs are classified, planned and validated")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify an input file and print the production request
    Classify {
        /// Input file; `-` reads stdin
        input: PathBuf,
    },
    /// Print the production plan an input file would get
    Plan {
        input: PathBuf,
    },
    /// Validate a declarative animation spec
    Validate {
        input: PathBuf,
    },
    /// Show recorded production runs, or one run's events
    History {
        /// Run id to show
        run: Option<String>,
    },
}
