use ecoscale_core::config::StabilizerCfg;
use ecoscale_core::protocol::{decode, encode};
use ecoscale_core::stabilizer::evaluate_burst;
use ecoscale_core::util::median;
use ecoscale_core::{AnalysisResult, ImpactLevel, ProtocolMessage, SensorMode};
use proptest::prelude::*;

// One-decimal values survive the fixed-precision wire format exactly.
fn tenths(max: i64) -> impl Strategy<Value = f64> {
    (-max..=max).prop_map(|n| n as f64 / 10.0)
}

fn impact() -> impl Strategy<Value = ImpactLevel> {
    prop_oneof![
        Just(ImpactLevel::Low),
        Just(ImpactLevel::Medium),
        Just(ImpactLevel::High),
        Just(ImpactLevel::VeryHigh),
    ]
}

fn message() -> impl Strategy<Value = ProtocolMessage> {
    prop_oneof![
        (tenths(100_000), any::<bool>())
            .prop_map(|(grams, stable)| ProtocolMessage::Weight { grams, stable }),
        (tenths(100_000), any::<bool>()).prop_map(|(grams, sim)| ProtocolMessage::Status {
            mode: if sim {
                SensorMode::Simulation
            } else {
                SensorMode::Real
            },
            grams,
        }),
        (
            "[a-z][a-z ]{0,11}",
            (0i64..=1000).prop_map(|n| n as f64 / 10.0),
            tenths(50_000),
            tenths(50_000),
            impact()
        )
            .prop_map(|(food_name, confidence_pct, weight_grams, co2_grams, impact_level)| {
                ProtocolMessage::AnalysisResult(AnalysisResult {
                    food_name,
                    confidence_pct,
                    weight_grams,
                    co2_grams,
                    impact_level,
                })
            }),
    ]
}

proptest! {
    #[test]
    fn decode_inverts_encode(m in message()) {
        prop_assert_eq!(decode(&encode(&m)), m);
    }

    #[test]
    fn decode_never_panics(line in "\\PC{0,80}") {
        let _ = decode(&line);
    }

    #[test]
    fn truncated_frames_are_unrecognized(m in message(), cut in 1usize..5) {
        let line = encode(&m);
        let fields: Vec<&str> = line.split(':').collect();
        let keep = fields.len().saturating_sub(cut).max(1);
        let short = fields[..keep].join(":");
        prop_assert!(decode(&short).is_unrecognized());
    }

    #[test]
    fn non_numeric_weight_is_unrecognized(junk in "[a-zA-Z_]{1,8}") {
        let line = format!("WEIGHT:{junk}:STABLE");
        prop_assert!(decode(&line).is_unrecognized());
    }

    #[test]
    fn large_variation_is_never_stable(
        samples in prop::collection::vec(0.0f64..2000.0, 5),
        last in 0.0f64..2000.0,
    ) {
        let cfg = StabilizerCfg::default();
        let hi = samples.iter().copied().fold(f64::MIN, f64::max);
        let lo = samples.iter().copied().fold(f64::MAX, f64::min);
        prop_assume!(hi - lo > cfg.large_variation_g);
        let v = evaluate_burst(&samples, last, &cfg);
        prop_assert!(!v.stable);
        prop_assert_eq!(v.weight_g, median(&samples));
        prop_assert_eq!(v.promote, None);
    }

    #[test]
    fn near_reference_reports_reference(
        last in 0.0f64..2000.0,
        offsets in prop::collection::vec(-4.9f64..4.9, 5),
    ) {
        let cfg = StabilizerCfg::default();
        let samples: Vec<f64> = offsets.iter().map(|d| last + d).collect();
        let v = evaluate_burst(&samples, last, &cfg);
        prop_assert!(v.stable);
        prop_assert_eq!(v.weight_g, last);
    }
}
