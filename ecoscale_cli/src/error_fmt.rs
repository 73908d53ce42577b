//! Human-readable error descriptions and structured JSON error formatting.

use ecoscale_core::error::TransportError;

/// Configuration could not be read, parsed or validated.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration ({source_name}): {reason}")]
pub struct ConfigError {
    pub source_name: String,
    pub reason: String,
}

/// Map an `eyre::Report` to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ce) = err.downcast_ref::<ConfigError>() {
        return format!(
            "What happened: Invalid configuration in {} ({}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. `ecoscale self-check` validates it without touching the link.",
            ce.source_name, ce.reason
        );
    }

    if let Some(te) = err.downcast_ref::<TransportError>() {
        return match te {
            TransportError::NoPort => "What happened: No scale was found on any serial port.\nLikely causes: The scale is unplugged, or its USB id/description does not match [link] usb_vid/descriptions.\nHow to fix: Plug the scale in, run `ecoscale ports` to see what is attached, or pass --port.".to_string(),
            TransportError::Open { port, reason } => format!(
                "What happened: Could not open serial port {port} ({reason}).\nLikely causes: Another program holds the port, or this user may not access serial devices.\nHow to fix: Close other serial monitors; on Linux add the user to the dialout group."
            ),
            TransportError::NotConnected => "What happened: The scale is not connected.\nLikely causes: The link dropped or was never opened.\nHow to fix: Reconnect the scale and rerun.".to_string(),
            TransportError::Write(reason) => format!(
                "What happened: Writing to the scale failed ({reason}).\nLikely causes: The cable was pulled mid-transfer.\nHow to fix: Check the USB cable and rerun."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if (lower.contains("hx711") && lower.contains("timeout")) || lower.contains("data-ready") {
        return "What happened: HX711 did not produce data within the configured timeout.\nLikely causes: Wrong DT/SCK pins, wiring/power issues, or timeout configured too low.\nHow to fix: Check [pins] in the config, verify power and ground, and raise stabilizer.sensor_read_timeout_ms.".to_string();
    }

    if lower.contains("gpio") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    // Calibration CSV header special-case
    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,grams'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: configuration 2, connection 3, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    if err.downcast_ref::<TransportError>().is_some() {
        return 3;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<ConfigError>().is_some() {
        return "Config";
    }
    match err.downcast_ref::<TransportError>() {
        Some(TransportError::NoPort) => "NoPort",
        Some(TransportError::Open { .. }) => "PortOpen",
        Some(TransportError::NotConnected) => "NotConnected",
        Some(TransportError::Write(_)) => "Write",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
