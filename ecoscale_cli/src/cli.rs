//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "ecoscale", version, about = "Food carbon-footprint scale")]
pub struct Cli {
    /// Path to config TOML (defaults apply when omitted)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Optional calibration CSV (strict `raw,grams` header)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Emit JSON lines instead of human-readable text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); `RUST_LOG` wins when set
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the scale, auto-trigger analyses and report what happens
    Host {
        /// Serial port to use; probe for the device when omitted
        #[arg(long, value_name = "PORT")]
        port: Option<String>,
        /// Image file re-read as the camera frame for every analysis
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,
        /// Stop after this many seconds
        #[arg(long = "duration-s", value_name = "SECS")]
        duration_s: Option<u64>,
    },
    /// Run the scale firmware loop against a simulated transducer
    DeviceSim {
        /// Serial port to talk to the host over
        #[arg(long, value_name = "PORT", conflicts_with = "stdio")]
        port: Option<String>,
        /// Use stdin/stdout as the link (the default when no port is given)
        #[arg(long, action = ArgAction::SetTrue)]
        stdio: bool,
        /// Load placed on the simulated scale after tare
        #[arg(long, value_name = "GRAMS", default_value_t = 0.0)]
        grams: f64,
        /// Tick on which the load is placed
        #[arg(long, value_name = "N", default_value_t = 3)]
        place_after: u64,
        /// Simulate a missing transducer (the loop runs on synthetic data)
        #[arg(long, action = ArgAction::SetTrue)]
        absent: bool,
        /// Stop after this many ticks
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
    },
    /// Decode protocol lines from stdin, one JSON object per line
    Decode,
    /// List serial ports and whether they look like the scale
    Ports,
    /// Validate configuration and report the sensor mode
    SelfCheck {
        /// Check against a missing transducer
        #[arg(long, action = ArgAction::SetTrue)]
        absent: bool,
    },
}
