//! Device display state machine and the tick loop.

use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use ecoscale_core::mocks::{Drawn, LoopbackDevice, RecordingScreen, ScriptedScale, loopback};
use ecoscale_core::protocol::encode_line;
use ecoscale_core::{
    AnalysisResult, DeviceCfg, DeviceLoop, DisplayController, DisplayMode, ImpactLevel,
    ProtocolMessage, Stabilizer, StabilizerCfg, WeightReading,
};
use ecoscale_traits::{ManualClock, PortOpener};

const SF: f64 = 10.0;

fn apple() -> AnalysisResult {
    AnalysisResult {
        food_name: "apple".into(),
        confidence_pct: 95.5,
        weight_grams: 150.5,
        co2_grams: 75.3,
        impact_level: ImpactLevel::Low,
    }
}

fn reading(g: f64) -> WeightReading {
    WeightReading {
        weight_grams: g,
        stable: true,
        at_ms: 0,
    }
}

#[test]
fn result_freezes_display_until_removal() {
    let mut d = DisplayController::new(RecordingScreen::default(), 5.0);
    d.on_reading(&reading(150.0));
    assert_eq!(d.mode(), DisplayMode::Live);

    d.on_message(&ProtocolMessage::AnalysisResult(apple()));
    assert_eq!(d.mode(), DisplayMode::ResultFrozen);
    let drawn = d.screen().drawn.len();

    for g in [150.0, 152.0, 90.0, 5.0] {
        d.on_reading(&reading(g));
    }
    assert_eq!(d.screen().drawn.len(), drawn, "frozen screen must not redraw");
    assert_eq!(d.shown_result(), Some(&apple()));

    d.on_reading(&reading(4.9));
    assert_eq!(d.mode(), DisplayMode::Live);
    assert_eq!(d.screen().last(), Some(&Drawn::Weight(reading(4.9))));
    assert_eq!(d.shown_result(), None);
}

#[test]
fn result_replaces_result_while_frozen() {
    let mut d = DisplayController::new(RecordingScreen::default(), 5.0);
    d.on_message(&ProtocolMessage::AnalysisResult(apple()));
    let mut pear = apple();
    pear.food_name = "pear".into();
    d.on_message(&ProtocolMessage::AnalysisResult(pear.clone()));
    assert_eq!(d.mode(), DisplayMode::ResultFrozen);
    assert_eq!(d.shown_result(), Some(&pear));
}

#[test]
fn other_messages_do_not_change_mode() {
    let mut d = DisplayController::new(RecordingScreen::default(), 5.0);
    d.on_message(&ProtocolMessage::Weight {
        grams: 10.0,
        stable: true,
    });
    assert_eq!(d.mode(), DisplayMode::Live);
    assert!(d.screen().drawn.is_empty());
}

type Dev = DeviceLoop<ScriptedScale, ManualClock, LoopbackDevice, RecordingScreen>;

fn device() -> (Dev, ScriptedScale, ecoscale_core::mocks::LoopbackOpener) {
    let (opener, link) = loopback("loop0");
    let scale = ScriptedScale::with_raws([0]);
    let clock = ManualClock::new();
    let cfg = StabilizerCfg {
        scale_factor: SF,
        warmup_samples: 0,
        tare_samples: 5,
        ..StabilizerCfg::default()
    };
    let engine = Stabilizer::new(scale.clone(), clock.clone(), cfg);
    let mut dev = DeviceLoop::new(engine, clock, link, RecordingScreen::default(), DeviceCfg::default());
    dev.start();
    (dev, scale, opener)
}

fn tick_with(dev: &mut Dev, scale: &ScriptedScale, grams: f64) -> WeightReading {
    scale.push_grams(&[grams; 5], SF);
    dev.tick().expect("reading")
}

#[test]
fn startup_announces_mode() {
    let (dev, _, _) = device();
    assert_eq!(
        dev.link().sent_lines(),
        vec!["STATUS:READY:MODE:REAL:WEIGHT:0.0".to_string()]
    );
}

#[test]
fn stable_load_is_reported_after_three_stable_ticks() {
    let (mut dev, scale, _) = device();
    let first = tick_with(&mut dev, &scale, 120.0);
    assert!(!first.stable);
    for _ in 0..2 {
        tick_with(&mut dev, &scale, 120.0);
    }
    assert_eq!(dev.link().sent_lines().len(), 1);
    tick_with(&mut dev, &scale, 120.0);
    assert_eq!(
        dev.link().sent_lines().last().map(String::as_str),
        Some("WEIGHT:120.0:STABLE")
    );
    assert_eq!(dev.ticks(), 4);
}

#[test]
fn host_result_freezes_and_removal_unfreezes() {
    let (mut dev, scale, opener) = device();
    for _ in 0..4 {
        tick_with(&mut dev, &scale, 150.0);
    }

    let mut host = opener
        .open("loop0", 115_200, Duration::from_millis(10))
        .unwrap()
        .writer;
    host.write_all(encode_line(&ProtocolMessage::AnalysisResult(apple())).as_bytes())
        .unwrap();
    host.write_all(b"garbage line\n").unwrap();

    tick_with(&mut dev, &scale, 150.0);
    assert_eq!(dev.display_mode(), DisplayMode::ResultFrozen);
    let drawn = dev.display().screen().drawn.len();
    assert_eq!(dev.display().screen().last(), Some(&Drawn::Result(apple())));

    tick_with(&mut dev, &scale, 152.0);
    assert_eq!(dev.display().screen().drawn.len(), drawn);

    let r = tick_with(&mut dev, &scale, 0.0);
    assert!(r.weight_grams < 5.0);
    assert_eq!(dev.display_mode(), DisplayMode::Live);
    let sent = dev.link().sent_lines();
    assert_eq!(sent.last().map(String::as_str), Some("WEIGHT:0.0:CHANGING"));
}

#[test]
fn runtime_fallback_sends_status_once() {
    let (mut dev, scale, _) = device();
    scale.push_failure("transducer unavailable");
    dev.tick();
    dev.tick();
    let status: Vec<String> = dev
        .link()
        .sent_lines()
        .into_iter()
        .filter(|l| l.starts_with("STATUS"))
        .collect();
    assert_eq!(
        status,
        vec![
            "STATUS:READY:MODE:REAL:WEIGHT:0.0".to_string(),
            "STATUS:READY:MODE:SIMULATION:WEIGHT:0.0".to_string()
        ]
    );
}

#[test]
fn run_stops_after_max_ticks() {
    let (mut dev, _, _) = device();
    let stop = AtomicBool::new(false);
    dev.run(Some(3), &stop);
    assert_eq!(dev.ticks(), 3);
}

#[test]
fn run_honours_stop_flag() {
    let (mut dev, _, _) = device();
    let stop = AtomicBool::new(true);
    dev.run(None, &stop);
    assert_eq!(dev.ticks(), 0);
}
