//! `From` implementations bridging `ecoscale_config` types to `ecoscale_core` types.

use std::time::Duration;

use crate::config::{DeviceCfg, DeviceSignature, HostCfg, LinkSettings, StabilizerCfg};
use crate::stabilizer::CalibrationState;

// ── StabilizerCfg ────────────────────────────────────────────────────────────

/// Built from the whole config: the scale factor honours a persisted calibration
/// and the synthetic floor follows the device removal floor.
impl From<&ecoscale_config::Config> for StabilizerCfg {
    fn from(c: &ecoscale_config::Config) -> Self {
        let s = &c.stabilizer;
        Self {
            scale_factor: c.effective_scale_factor(),
            burst_samples: s.burst_samples,
            burst_interval: Duration::from_millis(s.burst_interval_ms),
            large_variation_g: s.large_variation_g,
            stability_g: s.stability_g,
            tight_burst_g: s.tight_burst_g,
            tare_samples: s.tare_samples,
            tare_trim_ratio: s.tare_trim_ratio,
            warmup_samples: s.warmup_samples,
            init_retries: s.init_retries,
            init_retry_delay: Duration::from_millis(s.init_retry_delay_ms),
            max_failed_bursts: s.max_failed_bursts,
            sensor_timeout: Duration::from_millis(s.sensor_read_timeout_ms),
            min_weight_g: c.device.removal_floor_g,
        }
    }
}

// ── HostCfg ──────────────────────────────────────────────────────────────────

impl From<&ecoscale_config::HostSection> for HostCfg {
    fn from(c: &ecoscale_config::HostSection) -> Self {
        Self {
            auto_trigger_g: c.auto_trigger_g,
            removal_floor_g: c.removal_floor_g,
            poll_interval: Duration::from_millis(c.poll_interval_ms),
        }
    }
}

// ── DeviceCfg ────────────────────────────────────────────────────────────────

impl From<&ecoscale_config::DeviceSection> for DeviceCfg {
    fn from(c: &ecoscale_config::DeviceSection) -> Self {
        Self {
            tick: Duration::from_millis(c.tick_ms),
            removal_floor_g: c.removal_floor_g,
            required_stable: c.required_stable,
            resend_delta_g: c.resend_delta_g,
            resend_interval: Duration::from_millis(c.resend_interval_ms),
        }
    }
}

// ── LinkSettings ─────────────────────────────────────────────────────────────

impl From<&ecoscale_config::LinkCfg> for LinkSettings {
    fn from(c: &ecoscale_config::LinkCfg) -> Self {
        Self {
            baud: c.baud,
            read_timeout: Duration::from_millis(c.read_timeout_ms),
            signature: DeviceSignature {
                usb_vid: c.usb_vid,
                descriptions: c.descriptions.clone(),
            },
            ..Self::default()
        }
    }
}

// ── CalibrationState ─────────────────────────────────────────────────────────

impl From<ecoscale_config::Calibration> for CalibrationState {
    fn from(c: ecoscale_config::Calibration) -> Self {
        Self {
            offset: c.offset,
            scale_factor: c.scale_factor,
        }
    }
}
