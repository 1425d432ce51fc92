//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "roode", version, about = "Doorway people counter")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/roode.toml")]
    pub config: PathBuf,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start up and run the counting loop until Ctrl-C
    Run {
        /// Stop after this many loop iterations
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
        /// Drive the simulated doorway from a CSV script (room_mm,corridor_mm,motion)
        #[arg(long, value_name = "FILE")]
        replay: Option<PathBuf>,
        /// Empty-doorway distance seen by the simulated sensors
        #[arg(long, value_name = "MM", default_value_t = 1200)]
        ambient_mm: u16,
    },
    /// Calibrate both sensors, or compute a threshold offline from a CSV
    Calibrate {
        /// Ambient-sample CSV (header: distance_mm); skips the sensors entirely
        #[arg(long, value_name = "FILE")]
        samples: Option<PathBuf>,
    },
    /// Initialize both sensors and take one reading from each
    SelfCheck,
}
