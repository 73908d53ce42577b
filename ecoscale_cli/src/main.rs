mod cli;
mod collaborators;
mod device;
mod error_fmt;
mod host;
mod inspect;
mod logging;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use ecoscale_config::{Config, load_calibration_csv};
use eyre::Result;
use tracing::warn;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{ConfigError, exit_code_for_error, format_error_json, humanize};

fn config_error(path: &Path, reason: impl ToString) -> eyre::Report {
    eyre::Report::new(ConfigError {
        source_name: path.display().to_string(),
        reason: reason.to_string(),
    })
}

/// Read, parse and validate the config; defaults when no file is given.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let cfg = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| config_error(path, e))?;
            ecoscale_config::load_toml(&text).map_err(|e| config_error(path, e))?
        }
        None => Config::default(),
    };
    cfg.validate().map_err(|e| {
        config_error(path.unwrap_or_else(|| Path::new("<defaults>")), e)
    })?;
    Ok(cfg)
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref());
    let logging_cfg = cfg
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    logging::init(cli.json, cli.log_level.as_deref(), &logging_cfg)?;
    let cfg = cfg?;

    let calibration = cli
        .calibration
        .as_deref()
        .map(load_calibration_csv)
        .transpose()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            warn!(error = %e, "Ctrl-C handler not installed");
        }
    }

    match cli.cmd {
        Commands::Host {
            port,
            image,
            duration_s,
        } => host::run(
            &cfg,
            host::HostArgs {
                port,
                image,
                duration: duration_s.map(Duration::from_secs),
                json: cli.json,
            },
            &shutdown,
        ),
        Commands::DeviceSim {
            port,
            stdio: _,
            grams,
            place_after,
            absent,
            ticks,
        } => device::run(
            &cfg,
            calibration.as_ref(),
            device::DeviceArgs {
                port,
                grams,
                place_after,
                absent,
                ticks,
            },
            &shutdown,
        ),
        Commands::Decode => inspect::decode_stdin(),
        Commands::Ports => inspect::list_ports(&cfg, cli.json),
        Commands::SelfCheck { absent } => {
            inspect::self_check(&cfg, calibration.as_ref(), absent, cli.json)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    if let Err(err) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}
