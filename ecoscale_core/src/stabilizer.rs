//! Weight stabilization engine.
//!
//! Turns noisy raw transducer samples into `(weight, stable)` pairs without a moving
//! average. Each reading is one short burst of samples:
//!
//! 1. A burst wider than `large_variation_g` means the load is moving: report its
//!    median as changing and leave the stable reference alone.
//! 2. A median within `stability_g` of the stable reference is stable: report the
//!    reference itself so the number does not jitter.
//! 3. Otherwise a tight burst (`< tight_burst_g`) promotes its median to the new
//!    reference, reported as changing; it turns stable on the next matching burst.
//!
//! Tare and sampling never overlap: both take `&mut self`, and the device loop tares
//! before its first tick.

use std::time::Instant;

use ecoscale_traits::{Clock, Scale};
use tracing::{debug, info, trace, warn};

use crate::config::StabilizerCfg;
use crate::error::{EngineError, SensorError};
use crate::hw_error::map_sensor_error;
use crate::protocol::SensorMode;
use crate::synthetic::SyntheticCurve;
use crate::util::{median, range, trimmed_mean};

/// Linear conversion from raw counts: `grams = (raw - offset) / scale_factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationState {
    pub offset: f64,
    pub scale_factor: f64,
}

impl CalibrationState {
    #[inline]
    pub fn to_grams(&self, raw: i32) -> f64 {
        (f64::from(raw) - self.offset) / self.scale_factor
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightReading {
    /// Never negative.
    pub weight_grams: f64,
    pub stable: bool,
    /// Milliseconds since the engine was created.
    pub at_ms: u64,
}

/// Outcome of evaluating one burst against the current stable reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstVerdict {
    pub weight_g: f64,
    pub stable: bool,
    /// New stable reference, when the burst earned one.
    pub promote: Option<f64>,
}

/// Pure burst evaluation; see the module docs for the rules.
pub fn evaluate_burst(samples: &[f64], last_stable_g: f64, cfg: &StabilizerCfg) -> BurstVerdict {
    let spread = range(samples);
    let med = median(samples);

    if spread > cfg.large_variation_g {
        return BurstVerdict {
            weight_g: med,
            stable: false,
            promote: None,
        };
    }

    if (med - last_stable_g).abs() < cfg.stability_g {
        return BurstVerdict {
            weight_g: last_stable_g,
            stable: true,
            promote: None,
        };
    }

    BurstVerdict {
        weight_g: med,
        stable: false,
        promote: (spread < cfg.tight_burst_g).then_some(med),
    }
}

pub struct Stabilizer<S: Scale, C: Clock> {
    scale: S,
    clock: C,
    cfg: StabilizerCfg,
    calibration: CalibrationState,
    mode: SensorMode,
    calibrated: bool,
    last_stable_g: f64,
    last_reported_g: f64,
    failed_bursts: u32,
    mode_changed: bool,
    synthetic: SyntheticCurve,
    epoch: Instant,
}

impl<S: Scale, C: Clock> core::fmt::Debug for Stabilizer<S, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stabilizer")
            .field("mode", &self.mode)
            .field("calibration", &self.calibration)
            .field("calibrated", &self.calibrated)
            .field("last_stable_g", &self.last_stable_g)
            .finish_non_exhaustive()
    }
}

impl<S: Scale, C: Clock> Stabilizer<S, C> {
    /// Probe the transducer up to `init_retries` times; if every probe fails the
    /// engine runs on synthetic data for the rest of its life.
    pub fn new(scale: S, clock: C, cfg: StabilizerCfg) -> Self {
        let epoch = clock.now();
        let calibration = CalibrationState {
            offset: 0.0,
            scale_factor: cfg.scale_factor,
        };
        let synthetic = SyntheticCurve::new(cfg.stability_g, cfg.min_weight_g);
        let mut engine = Self {
            scale,
            clock,
            cfg,
            calibration,
            mode: SensorMode::Real,
            calibrated: false,
            last_stable_g: 0.0,
            last_reported_g: 0.0,
            failed_bursts: 0,
            mode_changed: false,
            synthetic,
            epoch,
        };
        if !engine.probe() {
            warn!(
                retries = engine.cfg.init_retries,
                "transducer did not respond; using synthetic weight data"
            );
            engine.mode = SensorMode::Simulation;
        }
        engine
    }

    fn probe(&mut self) -> bool {
        let retries = self.cfg.init_retries;
        for attempt in 1..=retries {
            match self.scale.read(self.cfg.sensor_timeout) {
                Ok(raw) => {
                    debug!(attempt, raw, "transducer probe ok");
                    return true;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "transducer probe failed");
                    if attempt < retries {
                        self.clock.sleep(self.cfg.init_retry_delay);
                    }
                }
            }
        }
        false
    }

    pub fn mode(&self) -> SensorMode {
        self.mode
    }

    pub fn calibration(&self) -> CalibrationState {
        self.calibration
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn last_stable_g(&self) -> f64 {
        self.last_stable_g
    }

    pub fn config(&self) -> &StabilizerCfg {
        &self.cfg
    }

    /// Returns true once after the engine switched to synthetic data at runtime.
    pub fn take_mode_change(&mut self) -> bool {
        std::mem::take(&mut self.mode_changed)
    }

    fn fall_back(&mut self, reason: &str) {
        if self.mode == SensorMode::Simulation {
            return;
        }
        warn!(reason, "transducer lost; switching to synthetic weight data");
        self.mode = SensorMode::Simulation;
        self.mode_changed = true;
    }

    fn read_grams(&mut self) -> Result<f64, SensorError> {
        match self.scale.read(self.cfg.sensor_timeout) {
            Ok(raw) => {
                trace!(raw, "raw sample");
                Ok(self.calibration.to_grams(raw))
            }
            Err(e) => Err(map_sensor_error(&*e)),
        }
    }

    /// Zero the scale: warm up, collect `tare_samples` raw reads, drop the extreme
    /// `tare_trim_ratio` at each tail and use the mean of the rest as the offset.
    ///
    /// If no tare sample can be read at all, the transducer is treated as gone and
    /// the engine falls back to synthetic data with a zero offset.
    pub fn tare(&mut self) -> CalibrationState {
        if self.mode == SensorMode::Real {
            for _ in 0..self.cfg.warmup_samples {
                if self.scale.read(self.cfg.sensor_timeout).is_err() {
                    break;
                }
                self.clock.sleep(self.cfg.burst_interval);
            }

            let mut raws = Vec::with_capacity(self.cfg.tare_samples);
            for i in 0..self.cfg.tare_samples {
                match self.scale.read(self.cfg.sensor_timeout) {
                    Ok(raw) => raws.push(f64::from(raw)),
                    Err(e) => debug!(sample = i, error = %e, "tare sample failed"),
                }
                self.clock.sleep(self.cfg.burst_interval);
            }

            match trimmed_mean(&raws, self.cfg.tare_trim_ratio) {
                Some(offset) => self.calibration.offset = offset,
                None => {
                    self.fall_back("no tare samples");
                    self.calibration.offset = 0.0;
                }
            }
        } else {
            self.calibration.offset = 0.0;
        }

        self.calibrated = true;
        self.last_stable_g = 0.0;
        self.last_reported_g = 0.0;
        self.failed_bursts = 0;
        info!(
            offset = self.calibration.offset,
            scale_factor = self.calibration.scale_factor,
            mode = self.mode.as_str(),
            "tare complete"
        );
        self.calibration
    }

    /// Take one reading. Only valid after [`Stabilizer::tare`].
    pub fn get_weight(&mut self) -> Result<WeightReading, EngineError> {
        if !self.calibrated {
            return Err(EngineError::NotCalibrated);
        }
        let (weight, stable) = match self.mode {
            SensorMode::Simulation => {
                let elapsed = self.clock.now().saturating_duration_since(self.epoch);
                self.synthetic.reading(elapsed)
            }
            SensorMode::Real => self.sample_burst(),
        };
        self.last_reported_g = weight;
        Ok(WeightReading {
            weight_grams: weight.max(0.0),
            stable,
            at_ms: self.clock.ms_since(self.epoch),
        })
    }

    fn sample_burst(&mut self) -> (f64, bool) {
        let n = self.cfg.burst_samples.max(1);
        let mut samples: Vec<f64> = Vec::with_capacity(n);
        let mut failures = 0usize;
        let mut lost: Option<SensorError> = None;

        for i in 0..n {
            if i > 0 {
                self.clock.sleep(self.cfg.burst_interval);
            }
            match self.read_grams() {
                Ok(g) => samples.push(g),
                Err(err) => {
                    failures += 1;
                    trace!(sample = i, error = %err, "sample failed; substituting previous");
                    if !err.is_transient() {
                        lost = Some(err);
                    }
                    samples.push(samples.last().copied().unwrap_or(0.0));
                }
            }
        }

        if let Some(err) = lost {
            self.fall_back(&err.to_string());
        }

        if failures == n {
            self.failed_bursts = self.failed_bursts.saturating_add(1);
            if self.failed_bursts >= self.cfg.max_failed_bursts {
                self.fall_back("consecutive bursts without a single sample");
            }
            // Substitutes alone must not move the stable reference.
            return (self.last_reported_g, false);
        }
        self.failed_bursts = 0;

        let verdict = evaluate_burst(&samples, self.last_stable_g, &self.cfg);
        if let Some(promoted) = verdict.promote {
            debug!(from = self.last_stable_g, to = promoted, "new stable candidate");
            self.last_stable_g = promoted;
        }
        (verdict.weight_g, verdict.stable)
    }
}
