//! Stabilization engine behaviour against scripted transducers.

use std::time::Duration;

use ecoscale_core::mocks::{DeadScale, ScriptedScale};
use ecoscale_core::{EngineError, SensorMode, Stabilizer, StabilizerCfg};
use ecoscale_traits::ManualClock;

const SF: f64 = 10.0;

fn cfg() -> StabilizerCfg {
    StabilizerCfg {
        scale_factor: SF,
        warmup_samples: 0,
        tare_samples: 5,
        init_retry_delay: Duration::from_millis(10),
        ..StabilizerCfg::default()
    }
}

/// Engine tared at zero; the returned handle feeds further samples.
fn tared() -> (Stabilizer<ScriptedScale, ManualClock>, ScriptedScale, ManualClock) {
    let scale = ScriptedScale::with_raws([0]);
    let clock = ManualClock::new();
    let mut engine = Stabilizer::new(scale.clone(), clock.clone(), cfg());
    engine.tare();
    (engine, scale, clock)
}

#[test]
fn reading_before_tare_is_refused() {
    let mut engine = Stabilizer::new(ScriptedScale::with_raws([0]), ManualClock::new(), cfg());
    assert_eq!(engine.get_weight(), Err(EngineError::NotCalibrated));
}

#[test]
fn tight_burst_promotes_then_confirms() {
    let (mut engine, scale, _) = tared();
    let burst = [120.1, 121.0, 119.8, 120.3, 120.0];

    scale.push_grams(&burst, SF);
    let first = engine.get_weight().unwrap();
    assert!((first.weight_grams - 120.1).abs() < 1e-9);
    assert!(!first.stable);
    assert!((engine.last_stable_g() - 120.1).abs() < 1e-9);

    scale.push_grams(&burst, SF);
    let second = engine.get_weight().unwrap();
    assert!((second.weight_grams - 120.1).abs() < 1e-9);
    assert!(second.stable);
}

#[test]
fn stable_reading_reports_reference_not_new_median() {
    let (mut engine, scale, _) = tared();
    scale.push_grams(&[200.0; 5], SF);
    engine.get_weight().unwrap();

    scale.push_grams(&[203.0, 202.5, 203.5, 202.0, 203.0], SF);
    let r = engine.get_weight().unwrap();
    assert!(r.stable);
    assert!((r.weight_grams - 200.0).abs() < 1e-9);
}

#[test]
fn large_variation_leaves_reference_untouched() {
    let (mut engine, scale, _) = tared();
    scale.push_grams(&[100.0; 5], SF);
    engine.get_weight().unwrap();

    scale.push_grams(&[100.0, 180.0, 140.0, 160.0, 120.0], SF);
    let r = engine.get_weight().unwrap();
    assert!(!r.stable);
    assert!((r.weight_grams - 140.0).abs() < 1e-9);
    assert!((engine.last_stable_g() - 100.0).abs() < 1e-9);
}

#[test]
fn burst_samples_are_spaced_by_the_interval() {
    let (mut engine, scale, clock) = tared();
    let before = clock.elapsed();
    scale.push_grams(&[50.0; 5], SF);
    engine.get_weight().unwrap();
    assert_eq!(clock.elapsed() - before, Duration::from_millis(200));
}

#[test]
fn transient_failure_reuses_previous_sample() {
    let (mut engine, scale, _) = tared();
    scale.push_raws([1000]);
    scale.push_failure("hx711 timeout");
    scale.push_raws([1000, 1000, 1000]);
    let r = engine.get_weight().unwrap();
    assert!((r.weight_grams - 100.0).abs() < 1e-9);
    assert_eq!(engine.mode(), SensorMode::Real);
}

#[test]
fn leading_failure_substitutes_zero() {
    let (mut engine, scale, _) = tared();
    scale.push_failure("hx711 timeout");
    scale.push_raws([1000, 1000, 1000, 1000]);
    let r = engine.get_weight().unwrap();
    // [0, 100, 100, 100, 100]: range 100 g, so this is a moving load
    assert!(!r.stable);
    assert!((r.weight_grams - 100.0).abs() < 1e-9);
}

#[test]
fn negative_weight_is_clamped() {
    let (mut engine, scale, _) = tared();
    scale.push_grams(&[-20.0; 5], SF);
    let r = engine.get_weight().unwrap();
    assert!(r.weight_grams.abs() < f64::EPSILON);
}

#[test]
fn tare_uses_trimmed_mean() {
    let scale = ScriptedScale::with_raws([0]);
    scale.push_raws([100, 101, 99, 100, 5000, -5000, 100, 101, 99, 100]);
    let mut engine = Stabilizer::new(
        scale,
        ManualClock::new(),
        StabilizerCfg {
            tare_samples: 10,
            ..cfg()
        },
    );
    let cal = engine.tare();
    assert!((cal.offset - 100.0).abs() < 1e-9);
    assert!(engine.is_calibrated());
}

#[test]
fn warmup_reads_are_discarded() {
    let scale = ScriptedScale::with_raws([0]);
    scale.push_raws([9999, 9999, 9999]);
    scale.push_raws([50; 5]);
    let mut engine = Stabilizer::new(
        scale.clone(),
        ManualClock::new(),
        StabilizerCfg {
            warmup_samples: 3,
            ..cfg()
        },
    );
    let cal = engine.tare();
    assert!((cal.offset - 50.0).abs() < 1e-9);
    assert_eq!(scale.reads(), 1 + 3 + 5);
}

#[test]
fn dead_transducer_at_startup_means_synthetic() {
    let clock = ManualClock::new();
    let mut engine = Stabilizer::new(DeadScale, clock.clone(), cfg());
    assert_eq!(engine.mode(), SensorMode::Simulation);
    // startup fallback is announced by the startup STATUS, not as a change
    assert!(!engine.take_mode_change());
    engine.tare();

    clock.set_offset(Duration::from_secs(12));
    let r = engine.get_weight().unwrap();
    assert!((r.weight_grams - 125.0).abs() < 1e-9);
    assert!(!r.stable);
    clock.set_offset(Duration::from_secs(13));
    let r = engine.get_weight().unwrap();
    assert!((r.weight_grams - 127.0).abs() < 1e-9);
    assert!(r.stable);
}

#[test]
fn unavailable_transducer_switches_to_synthetic_once() {
    let (mut engine, scale, _) = tared();
    scale.push_failure("transducer unavailable");
    engine.get_weight().unwrap();
    assert_eq!(engine.mode(), SensorMode::Simulation);
    assert!(engine.take_mode_change());
    assert!(!engine.take_mode_change());

    scale.push_raws([1234; 5]);
    engine.get_weight().unwrap();
    assert_eq!(engine.mode(), SensorMode::Simulation);
    assert_eq!(scale.remaining(), 5, "synthetic mode must not read the transducer");
}

#[test]
fn repeated_empty_bursts_switch_to_synthetic() {
    let (mut engine, scale, _) = tared();
    scale.push_grams(&[80.0; 5], SF);
    engine.get_weight().unwrap();

    for burst in 1..=3 {
        for _ in 0..5 {
            scale.push_failure("hx711 timeout");
        }
        let r = engine.get_weight().unwrap();
        assert!(!r.stable);
        // substitutes alone report the last weight, not zero
        assert!((r.weight_grams - 80.0).abs() < 1e-9);
        let expected = if burst < 3 {
            SensorMode::Real
        } else {
            SensorMode::Simulation
        };
        assert_eq!(engine.mode(), expected, "after burst {burst}");
    }
    assert!(engine.take_mode_change());
}

#[test]
fn tare_without_any_sample_falls_back() {
    let scale = ScriptedScale::with_raws([0]);
    for _ in 0..5 {
        scale.push_failure("hx711 timeout");
    }
    let mut engine = Stabilizer::new(scale, ManualClock::new(), cfg());
    let cal = engine.tare();
    assert_eq!(engine.mode(), SensorMode::Simulation);
    assert!(cal.offset.abs() < f64::EPSILON);
    assert!(engine.take_mode_change());
}

#[test]
fn separate_engines_do_not_share_state() {
    let (mut a, sa, _) = tared();
    let (mut b, sb, _) = tared();
    sa.push_grams(&[300.0; 5], SF);
    sb.push_grams(&[40.0; 5], SF);
    a.get_weight().unwrap();
    b.get_weight().unwrap();
    assert!((a.last_stable_g() - 300.0).abs() < 1e-9);
    assert!((b.last_stable_g() - 40.0).abs() < 1e-9);
}
