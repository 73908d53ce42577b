//! Deterministic stand-in for an absent transducer.
//!
//! A 30 second cycle: empty for 10 s, a steady load around 125 g for 10 s, then a
//! load that keeps drifting upward for the final 10 s. Enough to drive the display,
//! the report policy and the host's auto-trigger without hardware.

use std::time::Duration;

const CYCLE_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct SyntheticCurve {
    previous_g: Option<f64>,
    stability_g: f64,
    min_weight_g: f64,
}

impl SyntheticCurve {
    pub fn new(stability_g: f64, min_weight_g: f64) -> Self {
        Self {
            previous_g: None,
            stability_g,
            min_weight_g,
        }
    }

    /// Weight of the curve at `elapsed`, independent of history.
    pub fn weight_at(elapsed: Duration) -> f64 {
        let t = elapsed.as_secs() % CYCLE_SECS;
        match t {
            0..10 => 0.0,
            10..20 => 125.0 + (t % 3) as f64 * 2.0,
            _ => 80.0 + t as f64,
        }
    }

    /// Next `(weight, stable)` pair. Stable when the value stayed within the
    /// stability band since the previous call and is above the floor.
    pub fn reading(&mut self, elapsed: Duration) -> (f64, bool) {
        let w = Self::weight_at(elapsed);
        let stable = self
            .previous_g
            .is_some_and(|prev| (w - prev).abs() < self.stability_g && w > self.min_weight_g);
        self.previous_g = Some(w);
        (w, stable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_phases() {
        assert_eq!(SyntheticCurve::weight_at(Duration::from_secs(3)), 0.0);
        assert_eq!(SyntheticCurve::weight_at(Duration::from_secs(10)), 127.0);
        assert_eq!(SyntheticCurve::weight_at(Duration::from_secs(12)), 125.0);
        assert_eq!(SyntheticCurve::weight_at(Duration::from_secs(25)), 105.0);
        assert_eq!(SyntheticCurve::weight_at(Duration::from_secs(33)), 0.0);
    }

    #[test]
    fn steady_phase_becomes_stable_empty_never_does() {
        let mut c = SyntheticCurve::new(5.0, 5.0);
        assert_eq!(c.reading(Duration::from_secs(1)), (0.0, false));
        assert_eq!(c.reading(Duration::from_secs(2)), (0.0, false));
        let (w, stable) = c.reading(Duration::from_secs(11));
        assert_eq!((w, stable), (129.0, false));
        let (w, stable) = c.reading(Duration::from_secs(12));
        assert_eq!((w, stable), (125.0, true));
    }
}
