use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use ecoscale_core::config::StabilizerCfg;
use ecoscale_core::protocol::{decode, encode_line};
use ecoscale_core::stabilizer::evaluate_burst;
use ecoscale_core::{AnalysisResult, ImpactLevel, ProtocolMessage};

// Mix of frames seen on a busy link, including noise
const LINES: &[&str] = &[
    "WEIGHT:123.4:STABLE",
    "WEIGHT:98.0:CHANGING",
    "STATUS:READY:MODE:REAL:WEIGHT:0.0",
    "AI_RESULT:apple:95.5:150.5:75.3:LOW",
    "WEIGHT:abc:STABLE",
    "boot: pico sdk 1.5.1",
];

// Noisy bursts around a slowly moving load
fn bursts(n: usize, seed: u32) -> Vec<[f64; 5]> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    (0..n)
        .map(|i| {
            let base = 100.0 + (i as f64 / 50.0).sin() * 40.0;
            let mut b = [0.0; 5];
            for s in &mut b {
                *s = base + (next() * 2.0 - 1.0) * 8.0;
            }
            b
        })
        .collect()
}

fn bench_decode(c: &mut Criterion) {
    c.bench_function("decode_mixed_lines", |b| {
        b.iter(|| {
            for line in LINES {
                black_box(decode(black_box(line)));
            }
        });
    });
}

fn bench_encode(c: &mut Criterion) {
    let msg = ProtocolMessage::AnalysisResult(AnalysisResult {
        food_name: "chicken: grilled".into(),
        confidence_pct: 87.3,
        weight_grams: 212.4,
        co2_grams: 1380.6,
        impact_level: ImpactLevel::VeryHigh,
    });
    c.bench_function("encode_result_line", |b| {
        b.iter(|| black_box(encode_line(black_box(&msg))));
    });
}

fn bench_bursts(c: &mut Criterion) {
    let cfg = StabilizerCfg::default();
    let data = bursts(1_000, 0x00C0_FFEE);
    c.bench_function("evaluate_burst_1k", |b| {
        b.iter_batched(
            || data.clone(),
            |d| {
                let mut last = 0.0;
                for burst in &d {
                    let v = evaluate_burst(burst, last, &cfg);
                    if let Some(p) = v.promote {
                        last = p;
                    }
                }
                black_box(last)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_decode, bench_encode, bench_bursts);
criterion_main!(benches);
