//! Diagnostics: `decode`, `ports`, `self-check`.

use std::io::BufRead;

use ecoscale_config::{Calibration, Config};
use ecoscale_core::protocol::{ProtocolMessage, decode};
use ecoscale_core::{CalibrationState, LinkSettings, Stabilizer};
use ecoscale_hardware::SerialOpener;
use ecoscale_traits::{MonotonicClock, PortOpener};
use serde_json::{Value, json};

use crate::device::{make_scale, stabilizer_cfg};

pub fn message_json(msg: &ProtocolMessage) -> Value {
    match msg {
        ProtocolMessage::Weight { grams, stable } => {
            json!({ "type": msg.kind(), "grams": grams, "stable": stable })
        }
        ProtocolMessage::Status { mode, grams } => {
            json!({ "type": msg.kind(), "mode": mode.as_str(), "grams": grams })
        }
        ProtocolMessage::AnalysisResult(r) => json!({
            "type": msg.kind(),
            "food_name": r.food_name,
            "confidence_pct": r.confidence_pct,
            "weight_grams": r.weight_grams,
            "co2_grams": r.co2_grams,
            "impact_level": r.impact_level.as_str(),
        }),
        ProtocolMessage::Unrecognized(line) => json!({ "type": msg.kind(), "line": line }),
    }
}

/// Decode every stdin line; blank lines are skipped.
pub fn decode_stdin() -> eyre::Result<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        println!("{}", message_json(&decode(&line)));
    }
    Ok(())
}

pub fn list_ports(cfg: &Config, json_out: bool) -> eyre::Result<()> {
    let signature = LinkSettings::from(&cfg.link).signature;
    let ports = SerialOpener
        .available()
        .map_err(|e| eyre::eyre!("enumerate serial ports: {e}"))?;
    if ports.is_empty() && !json_out {
        println!("No serial ports found.");
    }
    for p in ports {
        let matches = signature.matches(&p);
        if json_out {
            println!(
                "{}",
                json!({
                    "name": p.name,
                    "description": p.description,
                    "usb_vid": p.usb_vid,
                    "usb_pid": p.usb_pid,
                    "matches": matches,
                })
            );
        } else {
            let ids = match (p.usb_vid, p.usb_pid) {
                (Some(v), Some(pid)) => format!(" [{v:04x}:{pid:04x}]"),
                _ => String::new(),
            };
            let mark = if matches { "  <- scale" } else { "" };
            println!(
                "{}{ids} {}{mark}",
                p.name,
                p.description.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

pub fn self_check(
    cfg: &Config,
    calibration: Option<&Calibration>,
    absent: bool,
    json_out: bool,
) -> eyre::Result<()> {
    let stab = stabilizer_cfg(cfg, calibration);
    let cal = calibration.map_or(
        CalibrationState {
            offset: 0.0,
            scale_factor: stab.scale_factor,
        },
        |c| CalibrationState::from(*c),
    );
    let (scale, _) = make_scale(cfg, &stab, absent)?;
    let engine = Stabilizer::new(scale, MonotonicClock::new(), stab);
    let mode = engine.mode();

    if json_out {
        println!(
            "{}",
            json!({
                "status": "ok",
                "sensor_mode": mode.as_str(),
                "scale_factor": cal.scale_factor,
                "offset": cal.offset,
            })
        );
    } else {
        println!("self-check OK");
        println!("  sensor mode:  {}", mode.as_str());
        println!("  scale factor: {:.3} counts/g", cal.scale_factor);
        if calibration.is_some() {
            println!("  offset:       {:.1} counts (from calibration CSV)", cal.offset);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_json_shape() {
        let v = message_json(&decode("WEIGHT:152.3:STABLE"));
        assert_eq!(v["type"], "WEIGHT");
        assert_eq!(v["stable"], true);
        assert!((v["grams"].as_f64().unwrap() - 152.3).abs() < 1e-9);
    }

    #[test]
    fn garbage_is_reported_with_its_line() {
        let v = message_json(&decode("hello"));
        assert_eq!(v["type"], "UNRECOGNIZED");
        assert_eq!(v["line"], "hello");
    }
}
