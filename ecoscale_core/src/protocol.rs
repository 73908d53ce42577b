//! Colon-delimited line protocol shared by the device and the host.
//!
//! ```text
//! WEIGHT:<grams:1dp>:<STABLE|CHANGING>
//! STATUS:READY:MODE:<REAL|SIMULATION>:WEIGHT:<grams:1dp>
//! AI_RESULT:<food>:<confidence_pct:1dp>:<grams:1dp>:<co2_grams:1dp>:<LOW|MEDIUM|HIGH|VERY_HIGH>
//! ```
//!
//! Decoding never fails: anything that is not one of the frames above, or that has
//! too few fields or a non-numeric value in a numeric position, becomes
//! [`ProtocolMessage::Unrecognized`]. Extra trailing fields are ignored.

use std::fmt;
use std::str::FromStr;

const TAG_WEIGHT: &str = "WEIGHT";
const TAG_STATUS: &str = "STATUS";
const TAG_RESULT: &str = "AI_RESULT";

/// Whether the device is reading a real transducer or generating synthetic data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMode {
    Real,
    Simulation,
}

impl SensorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorMode::Real => "REAL",
            SensorMode::Simulation => "SIMULATION",
        }
    }
}

impl FromStr for SensorMode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REAL" => Ok(SensorMode::Real),
            "SIMULATION" => Ok(SensorMode::Simulation),
            _ => Err(()),
        }
    }
}

/// Environmental impact band reported with an analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ImpactLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ImpactLevel::Low => "LOW",
            ImpactLevel::Medium => "MEDIUM",
            ImpactLevel::High => "HIGH",
            ImpactLevel::VeryHigh => "VERY_HIGH",
        }
    }

    /// Band for a total footprint in grams of CO₂.
    pub fn from_co2_grams(co2_g: f64) -> Self {
        if co2_g < 100.0 {
            ImpactLevel::Low
        } else if co2_g < 500.0 {
            ImpactLevel::Medium
        } else if co2_g < 1000.0 {
            ImpactLevel::High
        } else {
            ImpactLevel::VeryHigh
        }
    }
}

impl FromStr for ImpactLevel {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(ImpactLevel::Low),
            "MEDIUM" => Ok(ImpactLevel::Medium),
            "HIGH" => Ok(ImpactLevel::High),
            "VERY_HIGH" => Ok(ImpactLevel::VeryHigh),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed analysis pushed from the host to the device display.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub food_name: String,
    pub confidence_pct: f64,
    pub weight_grams: f64,
    pub co2_grams: f64,
    pub impact_level: ImpactLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    Weight { grams: f64, stable: bool },
    Status { mode: SensorMode, grams: f64 },
    AnalysisResult(AnalysisResult),
    /// Anything that did not decode; carries the line without its terminator.
    Unrecognized(String),
}

impl ProtocolMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolMessage::Weight { .. } => TAG_WEIGHT,
            ProtocolMessage::Status { .. } => TAG_STATUS,
            ProtocolMessage::AnalysisResult(_) => TAG_RESULT,
            ProtocolMessage::Unrecognized(_) => "UNRECOGNIZED",
        }
    }

    pub fn is_unrecognized(&self) -> bool {
        matches!(self, ProtocolMessage::Unrecognized(_))
    }
}

/// Replace characters that would break framing.
fn sanitize_field(s: &str) -> String {
    s.chars()
        .map(|c| if matches!(c, ':' | '\n' | '\r') { '_' } else { c })
        .collect()
}

/// Encode one message as a single line, without the terminator.
pub fn encode(msg: &ProtocolMessage) -> String {
    match msg {
        ProtocolMessage::Weight { grams, stable } => {
            let stability = if *stable { "STABLE" } else { "CHANGING" };
            format!("{TAG_WEIGHT}:{grams:.1}:{stability}")
        }
        ProtocolMessage::Status { mode, grams } => {
            format!("{TAG_STATUS}:READY:MODE:{}:WEIGHT:{grams:.1}", mode.as_str())
        }
        ProtocolMessage::AnalysisResult(r) => format!(
            "{TAG_RESULT}:{}:{:.1}:{:.1}:{:.1}:{}",
            sanitize_field(&r.food_name),
            r.confidence_pct,
            r.weight_grams,
            r.co2_grams,
            r.impact_level.as_str()
        ),
        ProtocolMessage::Unrecognized(raw) => raw.replace(['\n', '\r'], " "),
    }
}

/// Encode and guarantee exactly one trailing newline, ready for the wire.
pub fn encode_line(msg: &ProtocolMessage) -> String {
    let mut line = encode(msg);
    line.push('\n');
    line
}

/// Parse a finite float; `NaN`/`inf` are rejected like any other non-numeric text.
fn parse_num(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decode one line. Trailing `\r`/`\n` are stripped before parsing.
pub fn decode(line: &str) -> ProtocolMessage {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    decode_fields(trimmed).unwrap_or_else(|| ProtocolMessage::Unrecognized(trimmed.to_string()))
}

fn decode_fields(line: &str) -> Option<ProtocolMessage> {
    let parts: Vec<&str> = line.trim().split(':').collect();
    match parts.first().copied()? {
        TAG_WEIGHT => {
            let (grams, stability) = (parts.get(1)?, parts.get(2)?);
            let grams = parse_num(grams)?;
            let stable = stability.trim().eq_ignore_ascii_case("STABLE");
            Some(ProtocolMessage::Weight { grams, stable })
        }
        TAG_STATUS => {
            if parts.len() < 6 || parts[2] != "MODE" || parts[4] != "WEIGHT" {
                return None;
            }
            let mode = parts[3].trim().parse().ok()?;
            let grams = parse_num(parts[5])?;
            Some(ProtocolMessage::Status { mode, grams })
        }
        TAG_RESULT => {
            if parts.len() < 6 {
                return None;
            }
            Some(ProtocolMessage::AnalysisResult(AnalysisResult {
                food_name: parts[1].to_string(),
                confidence_pct: parse_num(parts[2])?,
                weight_grams: parse_num(parts[3])?,
                co2_grams: parse_num(parts[4])?,
                impact_level: parts[5].trim().parse().ok()?,
            }))
        }
        _ => None,
    }
}
