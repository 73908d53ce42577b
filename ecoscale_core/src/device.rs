//! Device-side cooperative scheduler.
//!
//! A single thread of control steps four phases per tick: check the link for a
//! host message, take one sampling burst, render, report. Then it yields for a
//! fixed delay. Tare runs to completion before the first tick, so sampling and
//! calibration never overlap and no locks are involved.

use std::sync::atomic::{AtomicBool, Ordering};

use ecoscale_traits::{Clock, LineIo, Scale};
use tracing::{debug, info, warn};

use crate::config::DeviceCfg;
use crate::display::{DisplayController, DisplayMode, Screen};
use crate::protocol::{ProtocolMessage, decode, encode};
use crate::stabilizer::{Stabilizer, WeightReading};

/// Decides which readings are worth a `WEIGHT` line.
///
/// A load is reported after `required_stable` consecutive stable readings above the
/// floor, then again only when it moved by more than `resend_delta_g` or
/// `resend_interval` passed. Taking the load off sends one last line below the floor.
#[derive(Debug, Clone)]
pub struct ReportPolicy {
    floor_g: f64,
    required_stable: u32,
    resend_delta_g: f64,
    resend_interval_ms: u64,
    stable_count: u32,
    last_sent: Option<(f64, u64)>,
}

impl ReportPolicy {
    pub fn new(cfg: &DeviceCfg) -> Self {
        Self {
            floor_g: cfg.removal_floor_g,
            required_stable: cfg.required_stable.max(1),
            resend_delta_g: cfg.resend_delta_g,
            resend_interval_ms: u64::try_from(cfg.resend_interval.as_millis()).unwrap_or(u64::MAX),
            stable_count: 0,
            last_sent: None,
        }
    }

    pub fn observe(&mut self, reading: &WeightReading) -> Option<ProtocolMessage> {
        let grams = reading.weight_grams;
        if grams < self.floor_g {
            self.stable_count = 0;
            return self.last_sent.take().map(|_| ProtocolMessage::Weight {
                grams,
                stable: reading.stable,
            });
        }
        if !reading.stable {
            self.stable_count = 0;
            return None;
        }
        self.stable_count = self.stable_count.saturating_add(1);
        if self.stable_count < self.required_stable {
            return None;
        }
        let due = self.last_sent.is_none_or(|(g, at)| {
            (grams - g).abs() > self.resend_delta_g
                || reading.at_ms.saturating_sub(at) > self.resend_interval_ms
        });
        if !due {
            return None;
        }
        self.last_sent = Some((grams, reading.at_ms));
        Some(ProtocolMessage::Weight {
            grams,
            stable: true,
        })
    }
}

pub struct DeviceLoop<S: Scale, C: Clock, L: LineIo, D: Screen> {
    engine: Stabilizer<S, C>,
    clock: C,
    link: L,
    display: DisplayController<D>,
    policy: ReportPolicy,
    cfg: DeviceCfg,
    started: bool,
    ticks: u64,
    last_reading: Option<WeightReading>,
}

impl<S, C, L, D> DeviceLoop<S, C, L, D>
where
    S: Scale,
    C: Clock + Clone,
    L: LineIo,
    D: Screen,
{
    /// `clock` should be the same clock the engine samples with.
    pub fn new(engine: Stabilizer<S, C>, clock: C, link: L, screen: D, cfg: DeviceCfg) -> Self {
        Self {
            engine,
            clock,
            link,
            display: DisplayController::new(screen, cfg.removal_floor_g),
            policy: ReportPolicy::new(&cfg),
            cfg,
            started: false,
            ticks: 0,
            last_reading: None,
        }
    }

    /// Tare, then announce the sensor mode to the host.
    pub fn start(&mut self) {
        let cal = self.engine.tare();
        self.started = true;
        info!(
            mode = self.engine.mode().as_str(),
            offset = cal.offset,
            "device ready"
        );
        self.send(&ProtocolMessage::Status {
            mode: self.engine.mode(),
            grams: 0.0,
        });
    }

    fn send(&mut self, msg: &ProtocolMessage) {
        if let Err(e) = self.link.send_line(&encode(msg)) {
            warn!(kind = msg.kind(), error = %e, "send to host failed");
        }
    }

    /// One scheduler step, including the trailing delay.
    pub fn tick(&mut self) -> Option<WeightReading> {
        if !self.started {
            self.start();
        }

        while let Some(line) = self.link.poll_line() {
            let msg = decode(&line);
            if msg.is_unrecognized() {
                debug!(line = %line, "unrecognized line from host");
                continue;
            }
            self.display.on_message(&msg);
        }

        let reading = match self.engine.get_weight() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "no reading this tick");
                self.clock.sleep(self.cfg.tick);
                return None;
            }
        };
        if self.engine.take_mode_change() {
            self.send(&ProtocolMessage::Status {
                mode: self.engine.mode(),
                grams: reading.weight_grams,
            });
        }

        self.display.on_reading(&reading);

        if let Some(msg) = self.policy.observe(&reading) {
            self.send(&msg);
        }

        self.ticks += 1;
        self.last_reading = Some(reading);
        self.clock.sleep(self.cfg.tick);
        Some(reading)
    }

    /// Tick until `stop` is raised or `max_ticks` ticks have run.
    pub fn run(&mut self, max_ticks: Option<u64>, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) && max_ticks.is_none_or(|max| self.ticks < max) {
            self.tick();
        }
        info!(ticks = self.ticks, "device loop stopped");
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display.mode()
    }

    pub fn display(&self) -> &DisplayController<D> {
        &self.display
    }

    pub fn engine(&self) -> &Stabilizer<S, C> {
        &self.engine
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_reading(&self) -> Option<WeightReading> {
        self.last_reading
    }
}
