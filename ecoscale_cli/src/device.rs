//! `ecoscale device-sim`: the scale firmware loop on a workstation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ecoscale_config::{Calibration, Config};
use ecoscale_core::{DeviceCfg, DeviceLoop, Stabilizer, StabilizerCfg};
use ecoscale_hardware::{AbsentScale, SerialLineIo, SimLoad, SimulatedScale, StdioLineIo};
use ecoscale_traits::{LineIo, MonotonicClock, Scale};
use eyre::WrapErr;
use tracing::info;

use crate::collaborators::ConsoleScreen;

pub struct DeviceArgs {
    pub port: Option<String>,
    pub grams: f64,
    pub place_after: u64,
    pub absent: bool,
    pub ticks: Option<u64>,
}

/// Engine parameters with a measured calibration applied on top of the config.
pub fn stabilizer_cfg(cfg: &Config, calibration: Option<&Calibration>) -> StabilizerCfg {
    let mut s = StabilizerCfg::from(cfg);
    if let Some(c) = calibration {
        s.scale_factor = c.scale_factor;
    }
    s
}

/// The transducer this build can offer, plus a handle for simulated loads.
pub fn make_scale(
    cfg: &Config,
    stab: &StabilizerCfg,
    absent: bool,
) -> eyre::Result<(Box<dyn Scale>, Option<SimLoad>)> {
    if absent {
        return Ok((Box::new(AbsentScale), None));
    }
    #[cfg(feature = "hardware")]
    {
        if let Some(pins) = &cfg.pins {
            let hw = ecoscale_hardware::HardwareScale::new(pins.hx711_dt, pins.hx711_sck)
                .wrap_err("open hx711")?;
            return Ok((Box::new(hw), None));
        }
    }
    #[cfg(not(feature = "hardware"))]
    let _ = cfg;
    let sim = SimulatedScale::new(stab.scale_factor).with_offset(8_000).with_jitter(40);
    let load = sim.load();
    Ok((Box::new(sim), Some(load)))
}

pub fn run(
    cfg: &Config,
    calibration: Option<&Calibration>,
    args: DeviceArgs,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let stab = stabilizer_cfg(cfg, calibration);
    let (scale, load) = make_scale(cfg, &stab, args.absent)?;
    let link: Box<dyn LineIo> = match args.port.as_deref() {
        Some(port) => Box::new(
            SerialLineIo::open(port, cfg.link.baud)
                .wrap_err_with(|| format!("open device link on {port}"))?,
        ),
        None => Box::new(StdioLineIo::spawn().wrap_err("open stdio link")?),
    };

    let clock = MonotonicClock::new();
    let engine = Stabilizer::new(scale, clock, stab);
    let mut device = DeviceLoop::new(
        engine,
        clock,
        link,
        ConsoleScreen::default(),
        DeviceCfg::from(&cfg.device),
    );

    device.start();
    while !shutdown.load(Ordering::Relaxed) && args.ticks.is_none_or(|max| device.ticks() < max) {
        if let Some(load) = &load
            && device.ticks() == args.place_after
        {
            load.set(args.grams);
        }
        device.tick();
    }
    info!(
        ticks = device.ticks(),
        mode = device.engine().mode().as_str(),
        "device-sim stopped"
    );
    Ok(())
}
