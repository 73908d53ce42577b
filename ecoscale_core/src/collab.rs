//! Collaborators consumed by the host orchestrator.
//!
//! Camera capture, the vision classifier and the emission-factor table live outside
//! this crate; only their shapes are fixed here.

use std::time::Duration;

use ecoscale_traits::BoxError;

use crate::protocol::ImpactLevel;

/// One captured camera image, already encoded by the frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What the classifier saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub food_name: String,
    /// Normally in `[0, 1]`; some services answer in percent.
    pub confidence: f64,
    /// Time the classifier spent on the frame.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    pub co2_grams: f64,
    pub impact_level: ImpactLevel,
}

/// Food classifier. Calls may take tens of seconds; the orchestrator runs them on
/// their own thread, so implementations should bound their own latency.
pub trait Classifier: Send + Sync {
    fn classify(&self, frame: &Frame) -> Result<Detection, BoxError>;
}

/// Footprint lookup. Must not fail: unknown foods get a usable default.
pub trait CarbonCalculator {
    fn compute(&self, food_name: &str, weight_grams: f64) -> Emission;
}

pub trait FrameSource {
    fn current_frame(&mut self) -> Option<Frame>;
}

impl<F: FrameSource + ?Sized> FrameSource for Box<F> {
    fn current_frame(&mut self) -> Option<Frame> {
        (**self).current_frame()
    }
}

impl<C: CarbonCalculator + ?Sized> CarbonCalculator for Box<C> {
    fn compute(&self, food_name: &str, weight_grams: f64) -> Emission {
        (**self).compute(food_name, weight_grams)
    }
}

/// Classifier confidence as a one-decimal percentage in `[0, 100]`.
///
/// Values in `[0, 1]` are fractions; anything above 1 is taken to already be a
/// percentage. Non-finite input maps to 0.
pub fn confidence_pct(confidence: f64) -> f64 {
    if !confidence.is_finite() {
        return 0.0;
    }
    let pct = if confidence <= 1.0 {
        confidence * 100.0
    } else {
        confidence
    };
    ((pct * 10.0).round() / 10.0).clamp(0.0, 100.0)
}
