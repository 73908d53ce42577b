#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration parsing for the scale and its host.
//!
//! - `Config` and its sections are deserialized from TOML and validated. Every
//!   section is optional; an empty file yields the built-in defaults.
//! - The calibration CSV loader enforces headers and performs a robust refit
//!   to reduce outlier influence before slope/intercept estimation.
use serde::Deserialize;

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,grams
///
/// Example:
/// raw,grams
/// 842913,0.0
/// 884813,100.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub grams: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkCfg {
    /// Serial port; probed by device signature when absent.
    pub port: Option<String>,
    pub baud: u32,
    pub read_timeout_ms: u64,
    /// USB vendor id that identifies the device when probing.
    pub usb_vid: Option<u16>,
    /// Case-insensitive substrings of the port description that identify the device.
    pub descriptions: Vec<String>,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
            read_timeout_ms: 50,
            usb_vid: Some(0x2e8a),
            descriptions: vec!["pico".into(), "usb serial device".into()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StabilizerSection {
    /// Raw counts per gram.
    pub scale_factor: f64,
    pub burst_samples: usize,
    pub burst_interval_ms: u64,
    pub large_variation_g: f64,
    pub stability_g: f64,
    pub tight_burst_g: f64,
    pub tare_samples: usize,
    pub tare_trim_ratio: f64,
    pub warmup_samples: usize,
    pub init_retries: u32,
    pub init_retry_delay_ms: u64,
    pub max_failed_bursts: u32,
    /// Max wait for one transducer conversion. Also accepts alias "sensor_ms".
    #[serde(alias = "sensor_ms")]
    pub sensor_read_timeout_ms: u64,
}

impl Default for StabilizerSection {
    fn default() -> Self {
        Self {
            scale_factor: 419.0,
            burst_samples: 5,
            burst_interval_ms: 50,
            large_variation_g: 50.0,
            stability_g: 5.0,
            tight_burst_g: 10.0,
            tare_samples: 20,
            tare_trim_ratio: 0.2,
            warmup_samples: 10,
            init_retries: 3,
            init_retry_delay_ms: 1000,
            max_failed_bursts: 3,
            sensor_read_timeout_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HostSection {
    pub auto_trigger_g: f64,
    pub removal_floor_g: f64,
    pub poll_interval_ms: u64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            auto_trigger_g: 50.0,
            removal_floor_g: 5.0,
            poll_interval_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceSection {
    pub tick_ms: u64,
    pub removal_floor_g: f64,
    pub required_stable: u32,
    pub resend_delta_g: f64,
    pub resend_interval_ms: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            removal_floor_g: 5.0,
            required_stable: 3,
            resend_delta_g: 2.0,
            resend_interval_ms: 5000,
        }
    }
}

/// HX711 wiring; only read by builds with real hardware.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Calibration measured earlier; preferred over the `[stabilizer]` scale factor.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct PersistedCalibration {
    /// Raw counts per gram.
    pub scale_factor: f64,
    /// Raw counts at zero load. Re-measured by tare at startup.
    #[serde(default)]
    pub offset: f64,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub link: LinkCfg,
    pub stabilizer: StabilizerSection,
    pub host: HostSection,
    pub device: DeviceSection,
    pub pins: Option<Pins>,
    pub calibration: Option<PersistedCalibration>,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    /// Scale factor in effect: persisted calibration first, then `[stabilizer]`.
    pub fn effective_scale_factor(&self) -> f64 {
        self.calibration
            .map_or(self.stabilizer.scale_factor, |c| c.scale_factor)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Link
        if self.link.baud == 0 {
            eyre::bail!("link.baud must be > 0");
        }
        if self.link.read_timeout_ms == 0 {
            eyre::bail!("link.read_timeout_ms must be >= 1");
        }
        if let Some(port) = &self.link.port
            && port.trim().is_empty()
        {
            eyre::bail!("link.port must not be empty when set");
        }

        // Stabilizer
        let s = &self.stabilizer;
        if !(s.scale_factor.is_finite() && s.scale_factor != 0.0) {
            eyre::bail!("stabilizer.scale_factor must be finite and non-zero");
        }
        if s.burst_samples == 0 {
            eyre::bail!("stabilizer.burst_samples must be >= 1");
        }
        if s.burst_samples > 50 {
            eyre::bail!("stabilizer.burst_samples is unreasonably large (>50)");
        }
        for (name, v) in [
            ("large_variation_g", s.large_variation_g),
            ("stability_g", s.stability_g),
            ("tight_burst_g", s.tight_burst_g),
        ] {
            if !(v.is_finite() && v > 0.0) {
                eyre::bail!("stabilizer.{name} must be > 0");
            }
        }
        if s.tight_burst_g > s.large_variation_g {
            eyre::bail!("stabilizer.tight_burst_g must not exceed stabilizer.large_variation_g");
        }
        if s.tare_samples == 0 {
            eyre::bail!("stabilizer.tare_samples must be >= 1");
        }
        if !(0.0..0.5).contains(&s.tare_trim_ratio) {
            eyre::bail!("stabilizer.tare_trim_ratio must be in [0.0, 0.5)");
        }
        if s.init_retries == 0 {
            eyre::bail!("stabilizer.init_retries must be >= 1");
        }
        if s.max_failed_bursts == 0 {
            eyre::bail!("stabilizer.max_failed_bursts must be >= 1");
        }
        if s.sensor_read_timeout_ms == 0 {
            eyre::bail!("stabilizer.sensor_read_timeout_ms must be >= 1");
        }

        // Host
        let h = &self.host;
        if !(h.removal_floor_g.is_finite() && h.removal_floor_g >= 0.0) {
            eyre::bail!("host.removal_floor_g must be >= 0");
        }
        if !(h.auto_trigger_g.is_finite() && h.auto_trigger_g > h.removal_floor_g) {
            eyre::bail!("host.auto_trigger_g must be greater than host.removal_floor_g");
        }
        if h.poll_interval_ms == 0 {
            eyre::bail!("host.poll_interval_ms must be >= 1");
        }

        // Device
        let d = &self.device;
        if d.tick_ms == 0 {
            eyre::bail!("device.tick_ms must be >= 1");
        }
        if !(d.removal_floor_g.is_finite() && d.removal_floor_g >= 0.0) {
            eyre::bail!("device.removal_floor_g must be >= 0");
        }
        if d.required_stable == 0 {
            eyre::bail!("device.required_stable must be >= 1");
        }
        if !(d.resend_delta_g.is_finite() && d.resend_delta_g >= 0.0) {
            eyre::bail!("device.resend_delta_g must be >= 0");
        }
        if d.resend_interval_ms > 24 * 60 * 60 * 1000 {
            eyre::bail!("device.resend_interval_ms is unreasonably large (>24h)");
        }

        // Calibration
        if let Some(c) = self.calibration {
            if !(c.scale_factor.is_finite() && c.scale_factor != 0.0) {
                eyre::bail!("calibration.scale_factor must be finite and non-zero");
            }
            if !c.offset.is_finite() {
                eyre::bail!("calibration.offset must be finite");
            }
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        Ok(())
    }
}

/// Linear calibration in the engine's form: `grams = (raw - offset) / scale_factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Raw counts at zero load.
    pub offset: f64,
    /// Raw counts per gram.
    pub scale_factor: f64,
}

impl From<PersistedCalibration> for Calibration {
    fn from(p: PersistedCalibration) -> Self {
        Self {
            offset: p.offset,
            scale_factor: p.scale_factor,
        }
    }
}

/// OLS fit of `grams = a*raw + b` in f64.
fn fit(pts: &[(f64, f64)]) -> eyre::Result<(f64, f64)> {
    #[allow(clippy::cast_precision_loss)]
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut sxy) = (0.0f64, 0.0f64);
    for (x, y) in pts {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine slope (degenerate X variance)");
    }
    let a = sxy / sxx;
    if !a.is_finite() {
        eyre::bail!("calibration produced non-finite slope");
    }
    if a == 0.0 {
        eyre::bail!("calibration produced zero slope (invalid scale factor)");
    }
    Ok((a, mean_y - a * mean_x))
}

impl Calibration {
    /// Build a calibration from rows using ordinary least squares, then one refit
    /// without points whose residual exceeds twice the RMS.
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }

        // Strictly monotonic raw values (either direction), no duplicates
        let mut dir = 0i8;
        for (i, w) in rows.windows(2).enumerate() {
            let step = match w[1].raw.cmp(&w[0].raw) {
                std::cmp::Ordering::Equal => eyre::bail!(
                    "calibration rows have duplicate raw values at index {} and {}",
                    i,
                    i + 1
                ),
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Less => -1,
            };
            if dir == 0 {
                dir = step;
            } else if dir != step {
                eyre::bail!(
                    "calibration raw values must be monotonic (strictly increasing or strictly decreasing)"
                );
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let pts: Vec<(f64, f64)> = rows.iter().map(|r| (r.raw as f64, r.grams)).collect();
        let (a0, b0) = fit(&pts)?;
        #[allow(clippy::cast_precision_loss)]
        let rms = (pts
            .iter()
            .map(|(x, y)| (y - (a0 * x + b0)).powi(2))
            .sum::<f64>()
            / pts.len() as f64)
            .sqrt();

        let (a, b) = robust_refit(&pts, a0, b0, rms, 2.0).unwrap_or((a0, b0));

        let offset = -b / a;
        if !offset.is_finite() {
            eyre::bail!("calibration produced invalid tare baseline");
        }
        Ok(Self {
            offset,
            scale_factor: 1.0 / a,
        })
    }
}

/// Refit on inliers (`|residual| <= k * rms`) around `y = a0*x + b0`. Returns `None`
/// when nothing was rejected, fewer than two points remain or the fit degenerates;
/// the caller then keeps the original line.
fn robust_refit(pts: &[(f64, f64)], a0: f64, b0: f64, rms: f64, k: f64) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0 && k.is_finite() && k > 0.0) {
        return None;
    }
    let thr = k * rms;
    let inliers: Vec<(f64, f64)> = pts
        .iter()
        .copied()
        .filter(|(x, y)| (y - (a0 * x + b0)).abs() <= thr)
        .collect();
    if inliers.len() < 2 || inliers.len() == pts.len() {
        return None;
    }
    fit(&inliers).ok()
}

impl TryFrom<&[CalibrationRow]> for Calibration {
    type Error = eyre::Report;
    fn try_from(rows: &[CalibrationRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Calibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {}: {e}", path.display()))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {}: {e}", path.display()))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != ["raw", "grams"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,grams', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {e}", idx + 2),
        }
    }

    Calibration::from_rows(&rows)
}
