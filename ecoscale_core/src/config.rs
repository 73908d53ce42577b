//! Runtime configuration for the engine, transport and both state machines.
//!
//! These are passed explicitly into constructors; nothing here is global. They are
//! separate from the TOML-deserialized config in `ecoscale_config`.

use std::time::Duration;

/// Stabilization engine parameters.
#[derive(Debug, Clone)]
pub struct StabilizerCfg {
    /// Raw counts per gram.
    pub scale_factor: f64,
    /// Samples per reading burst.
    pub burst_samples: usize,
    /// Spacing between samples within a burst.
    pub burst_interval: Duration,
    /// A burst wider than this means the load is actively changing.
    pub large_variation_g: f64,
    /// Median within this distance of the last stable weight counts as stable.
    pub stability_g: f64,
    /// A burst narrower than this may promote its median to the new stable weight.
    pub tight_burst_g: f64,
    /// Samples collected during tare.
    pub tare_samples: usize,
    /// Fraction discarded at each tail of the tare set.
    pub tare_trim_ratio: f64,
    /// Reads discarded before tare on real hardware.
    pub warmup_samples: usize,
    /// Probe reads attempted before falling back to synthetic data.
    pub init_retries: u32,
    pub init_retry_delay: Duration,
    /// Consecutive fully failed bursts that count as the transducer being gone.
    pub max_failed_bursts: u32,
    /// Per-read timeout passed to the transducer.
    pub sensor_timeout: Duration,
    /// Floor used by the synthetic generator's stability rule.
    pub min_weight_g: f64,
}

impl Default for StabilizerCfg {
    fn default() -> Self {
        Self {
            scale_factor: 419.0,
            burst_samples: 5,
            burst_interval: Duration::from_millis(50),
            large_variation_g: 50.0,
            stability_g: 5.0,
            tight_burst_g: 10.0,
            tare_samples: 20,
            tare_trim_ratio: 0.2,
            warmup_samples: 10,
            init_retries: 3,
            init_retry_delay: Duration::from_millis(1000),
            max_failed_bursts: 3,
            sensor_timeout: Duration::from_millis(150),
            min_weight_g: 5.0,
        }
    }
}

/// Host orchestration thresholds.
#[derive(Debug, Clone)]
pub struct HostCfg {
    /// Stable weight above this starts a classification automatically.
    pub auto_trigger_g: f64,
    /// Weight below this means the object was removed.
    pub removal_floor_g: f64,
    /// Pacing for the host polling loop.
    pub poll_interval: Duration,
}

impl Default for HostCfg {
    fn default() -> Self {
        Self {
            auto_trigger_g: 50.0,
            removal_floor_g: 5.0,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Device scheduler and reporting policy.
#[derive(Debug, Clone)]
pub struct DeviceCfg {
    /// Fixed delay yielded at the end of every tick.
    pub tick: Duration,
    /// Weight below this unfreezes the result view and counts as "empty".
    pub removal_floor_g: f64,
    /// Consecutive stable readings required before a weight is reported.
    pub required_stable: u32,
    /// Minimum change since the last report that justifies a new one.
    pub resend_delta_g: f64,
    /// A stable weight is re-reported after this long even if unchanged.
    pub resend_interval: Duration,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(200),
            removal_floor_g: 5.0,
            required_stable: 3,
            resend_delta_g: 2.0,
            resend_interval: Duration::from_millis(5000),
        }
    }
}

/// USB/description signature used to pick a port when none is configured.
#[derive(Debug, Clone)]
pub struct DeviceSignature {
    pub usb_vid: Option<u16>,
    /// Case-insensitive substrings matched against the port description.
    pub descriptions: Vec<String>,
}

impl Default for DeviceSignature {
    fn default() -> Self {
        Self {
            usb_vid: Some(0x2e8a),
            descriptions: vec!["pico".into(), "usb serial device".into()],
        }
    }
}

impl DeviceSignature {
    pub fn matches(&self, port: &ecoscale_traits::PortInfo) -> bool {
        if let (Some(want), Some(have)) = (self.usb_vid, port.usb_vid)
            && want == have
        {
            return true;
        }
        let Some(desc) = port.description.as_deref() else {
            return false;
        };
        let desc = desc.to_lowercase();
        self.descriptions
            .iter()
            .any(|needle| desc.contains(&needle.to_lowercase()))
    }
}

/// Fixed link configuration agreed by both ends (8N1 framing is implied).
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub baud: u32,
    pub read_timeout: Duration,
    pub signature: DeviceSignature,
    /// Partial lines longer than this are discarded.
    pub max_line_len: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud: 115_200,
            read_timeout: Duration::from_millis(50),
            signature: DeviceSignature::default(),
            max_line_len: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecoscale_traits::PortInfo;

    #[test]
    fn signature_matches_vid_or_description() {
        let sig = DeviceSignature::default();
        let by_vid = PortInfo {
            name: "/dev/ttyACM0".into(),
            usb_vid: Some(0x2e8a),
            ..Default::default()
        };
        let by_desc = PortInfo {
            name: "COM5".into(),
            description: Some("USB Serial Device (COM5)".into()),
            ..Default::default()
        };
        let other = PortInfo {
            name: "/dev/ttyS0".into(),
            description: Some("16550A UART".into()),
            usb_vid: Some(0x0403),
            ..Default::default()
        };
        assert!(sig.matches(&by_vid));
        assert!(sig.matches(&by_desc));
        assert!(!sig.matches(&other));
    }
}
