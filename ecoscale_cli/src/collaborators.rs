//! Reference collaborators that make the binary runnable on a bench.
//!
//! Real camera capture, vision models and emission databases plug in through the
//! same traits; these only stand in for them.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ecoscale_core::collab::{CarbonCalculator, Classifier, Detection, Emission, Frame, FrameSource};
use ecoscale_core::protocol::{AnalysisResult, ImpactLevel};
use ecoscale_core::stabilizer::WeightReading;
use ecoscale_core::Screen;
use ecoscale_traits::BoxError;
use tracing::debug;

/// Kilograms of CO2e per kilogram of food when the food is not in the table.
pub const DEFAULT_KG_PER_KG: f64 = 2.5;

/// Cycles through a fixed menu, one food per call.
pub struct DemoClassifier {
    menu: Vec<(&'static str, f64)>,
    next: AtomicUsize,
    delay: Duration,
}

impl DemoClassifier {
    pub fn new(delay: Duration) -> Self {
        Self {
            menu: vec![
                ("apple", 0.94),
                ("rice", 0.88),
                ("chicken", 0.91),
                ("beef", 0.86),
                ("banana", 0.97),
            ],
            next: AtomicUsize::new(0),
            delay,
        }
    }
}

impl Classifier for DemoClassifier {
    fn classify(&self, frame: &Frame) -> Result<Detection, BoxError> {
        if frame.is_empty() {
            return Err("empty camera frame".into());
        }
        let started = Instant::now();
        std::thread::sleep(self.delay);
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.menu.len();
        let (food_name, confidence) = self.menu[idx];
        Ok(Detection {
            food_name: food_name.to_string(),
            confidence,
            elapsed: started.elapsed(),
        })
    }
}

/// Emission factors in kg CO2e per kg of food.
pub struct TableCalculator {
    factors: HashMap<String, f64>,
    default_factor: f64,
}

impl Default for TableCalculator {
    fn default() -> Self {
        let factors = [
            ("beef", 27.0),
            ("lamb", 39.2),
            ("cheese", 13.5),
            ("pork", 12.1),
            ("chicken", 6.9),
            ("fish", 6.1),
            ("eggs", 4.8),
            ("rice", 2.7),
            ("tofu", 2.0),
            ("bread", 1.4),
            ("pasta", 1.1),
            ("potato", 0.3),
            ("apple", 0.4),
            ("banana", 0.9),
            ("tomato", 1.4),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            factors,
            default_factor: DEFAULT_KG_PER_KG,
        }
    }
}

impl TableCalculator {
    pub fn factor_for(&self, food_name: &str) -> f64 {
        self.factors
            .get(&food_name.trim().to_lowercase())
            .copied()
            .unwrap_or(self.default_factor)
    }
}

impl CarbonCalculator for TableCalculator {
    fn compute(&self, food_name: &str, weight_grams: f64) -> Emission {
        // kg per kg is the same ratio as g per g
        let co2_grams = weight_grams.max(0.0) * self.factor_for(food_name);
        Emission {
            co2_grams,
            impact_level: ImpactLevel::from_co2_grams(co2_grams),
        }
    }
}

/// Frame source reading an image file on every request, or a blank placeholder.
pub enum ImageFrames {
    File(PathBuf),
    Blank,
}

impl FrameSource for ImageFrames {
    fn current_frame(&mut self) -> Option<Frame> {
        match self {
            ImageFrames::File(path) => match std::fs::read(&*path) {
                Ok(bytes) => Some(Frame::new(bytes)),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "no camera frame");
                    None
                }
            },
            ImageFrames::Blank => Some(Frame::new(vec![0u8; 64])),
        }
    }
}

/// Device screen rendered to stderr; only redraws when the text changes.
#[derive(Default)]
pub struct ConsoleScreen {
    shown: String,
}

impl ConsoleScreen {
    fn draw(&mut self, text: String) {
        if text == self.shown {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "[screen] {text}");
        self.shown = text;
    }
}

impl Screen for ConsoleScreen {
    fn show_weight(&mut self, reading: &WeightReading) {
        let marker = if reading.stable { "" } else { " ~" };
        self.draw(format!("{:.1} g{marker}", reading.weight_grams));
    }

    fn show_result(&mut self, result: &AnalysisResult) {
        self.draw(format!(
            "{} {:.1}% | {:.1} g | {:.1} g CO2e | {}",
            result.food_name,
            result.confidence_pct,
            result.weight_grams,
            result.co2_grams,
            result.impact_level
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("beef", 200.0, 5400.0, ImpactLevel::VeryHigh)]
    #[case("Apple", 150.0, 60.0, ImpactLevel::Low)]
    #[case("mystery stew", 100.0, 250.0, ImpactLevel::Medium)]
    #[case("chicken", 100.0, 690.0, ImpactLevel::High)]
    fn table_lookup(
        #[case] food: &str,
        #[case] grams: f64,
        #[case] co2: f64,
        #[case] level: ImpactLevel,
    ) {
        let e = TableCalculator::default().compute(food, grams);
        assert!((e.co2_grams - co2).abs() < 1e-9, "{}", e.co2_grams);
        assert_eq!(e.impact_level, level);
    }

    #[test]
    fn demo_classifier_cycles_and_rejects_empty_frames() {
        let c = DemoClassifier::new(Duration::ZERO);
        let frame = Frame::new(vec![1u8; 4]);
        let first = c.classify(&frame).unwrap();
        let second = c.classify(&frame).unwrap();
        assert_ne!(first.food_name, second.food_name);
        assert!(c.classify(&Frame::new(Vec::new())).is_err());
    }

    #[test]
    fn missing_image_file_means_no_frame() {
        let mut frames = ImageFrames::File(PathBuf::from("/nonexistent/ecoscale/frame.jpg"));
        assert!(frames.current_frame().is_none());
        assert!(!ImageFrames::Blank.current_frame().unwrap().is_empty());
    }
}
