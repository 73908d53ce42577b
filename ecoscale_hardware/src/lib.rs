//! Concrete transducers and links for the ecoscale device and host.
//!
//! - [`SimulatedScale`] / [`AbsentScale`] stand in for the HX711 when no board is attached.
//! - [`serial::SerialOpener`] and [`serial::SerialLineIo`] carry the line protocol over USB serial.
//! - [`stdio::StdioLineIo`] carries it over the process's stdin/stdout.
//! - `HardwareScale` (feature `hardware`) drives a real HX711 on Raspberry Pi GPIO.
pub mod error;
#[cfg(feature = "hardware")]
pub mod hx711;
pub mod serial;
pub mod stdio;
pub mod util;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ecoscale_traits::{BoxError, Scale};

pub use error::HwError;
pub use serial::{SerialLineIo, SerialOpener};
pub use stdio::StdioLineIo;

/// Shared handle to the load sitting on a [`SimulatedScale`], in grams.
#[derive(Clone, Debug, Default)]
pub struct SimLoad(Arc<AtomicU64>);

impl SimLoad {
    pub fn new(grams: f64) -> Self {
        Self(Arc::new(AtomicU64::new(grams.to_bits())))
    }

    pub fn set(&self, grams: f64) {
        self.0.store(grams.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Simulated scale producing raw counts for a settable load plus deterministic jitter.
pub struct SimulatedScale {
    load: SimLoad,
    offset: i32,
    counts_per_gram: f64,
    jitter_counts: u32,
    seed: u32,
}

impl SimulatedScale {
    pub fn new(counts_per_gram: f64) -> Self {
        Self {
            load: SimLoad::default(),
            offset: 0,
            counts_per_gram,
            jitter_counts: 0,
            seed: 0x9E37_79B9,
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    /// Peak-to-peak noise, in counts, added to every sample.
    #[must_use]
    pub fn with_jitter(mut self, counts: u32) -> Self {
        self.jitter_counts = counts;
        self
    }

    pub fn load(&self) -> SimLoad {
        self.load.clone()
    }

    fn next_noise(&mut self) -> i32 {
        if self.jitter_counts == 0 {
            return 0;
        }
        // xorshift32
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = x;
        let span = self.jitter_counts + 1;
        i32::try_from(x % span).unwrap_or(0) - i32::try_from(self.jitter_counts / 2).unwrap_or(0)
    }
}

impl Default for SimulatedScale {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Scale for SimulatedScale {
    #[allow(clippy::cast_possible_truncation)]
    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        let counts = (self.load.get() * self.counts_per_gram).round();
        let counts = counts.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
        let raw = counts
            .saturating_add(self.offset)
            .saturating_add(self.next_noise());
        tracing::trace!(raw, grams = self.load.get(), "simulated scale sample");
        Ok(raw)
    }
}

/// A scale that is never there; every read reports [`HwError::Absent`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AbsentScale;

impl Scale for AbsentScale {
    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        Err(Box::new(HwError::Absent))
    }
}

#[cfg(feature = "hardware")]
pub struct HardwareScale {
    hx711: hx711::Hx711,
}

#[cfg(feature = "hardware")]
impl HardwareScale {
    pub fn new(dt_pin: u8, sck_pin: u8) -> Result<Self, HwError> {
        let hx711 = hx711::Hx711::new(dt_pin, sck_pin, hx711::GAIN_PULSES_A128)?;
        Ok(Self { hx711 })
    }
}

#[cfg(feature = "hardware")]
impl Scale for HardwareScale {
    fn read(&mut self, timeout: Duration) -> Result<i32, BoxError> {
        let mut attempts = 0;
        let max_attempts = 3;
        loop {
            match self.hx711.read_with_timeout(timeout) {
                Ok(raw) => {
                    tracing::debug!(raw, "hx711 sample");
                    return Ok(raw);
                }
                Err(HwError::DataReadyTimeout) if attempts < max_attempts => {
                    attempts += 1;
                    tracing::warn!(retries = attempts, "scale timeout, retrying");
                }
                Err(e) => {
                    tracing::error!("Scale read error: {}", e);
                    return Err(Box::new(e));
                }
            }
        }
    }
}
