//! Device loop and host controller talking over one in-memory link.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ecoscale_core::mocks::{
    FixedClassifier, FlatCalculator, LoopbackOpener, RecordingScreen, ScriptedScale, StaticFrames,
    loopback,
};
use ecoscale_core::{
    AnalysisStatus, ConnectionStatus, DeviceCfg, DeviceLoop, DisplayMode, HostCfg, HostController,
    HostEvent, LinkSettings, SensorMode, Stabilizer, StabilizerCfg,
};
use ecoscale_traits::ManualClock;

const SF: f64 = 10.0;

type Host = HostController<LoopbackOpener, FlatCalculator, StaticFrames>;

fn host(opener: LoopbackOpener) -> Host {
    HostController::new(
        opener,
        LinkSettings {
            read_timeout: Duration::from_millis(10),
            ..LinkSettings::default()
        },
        HostCfg::default(),
        Arc::new(FixedClassifier::new("apple", 0.955)),
        FlatCalculator::new(0.5),
        StaticFrames::blank(),
    )
}

/// Poll the host until `done` holds, collecting every event on the way.
fn poll_until(host: &mut Host, events: &mut Vec<HostEvent>, done: impl Fn(&Host) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        events.extend(host.poll());
        if done(host) {
            return;
        }
        assert!(Instant::now() < deadline, "host never reached expected state; events: {events:?}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn weigh_classify_display_and_remove() {
    let (opener, link) = loopback("loop0");
    let mut host = host(opener);
    let mut events = Vec::new();
    host.connect(None).unwrap();
    assert_eq!(host.connection_status(), ConnectionStatus::Connected);

    let scale = ScriptedScale::with_raws([0]);
    let clock = ManualClock::new();
    let engine = Stabilizer::new(
        scale.clone(),
        clock.clone(),
        StabilizerCfg {
            scale_factor: SF,
            warmup_samples: 0,
            tare_samples: 5,
            ..StabilizerCfg::default()
        },
    );
    let mut device = DeviceLoop::new(engine, clock, link, RecordingScreen::default(), DeviceCfg::default());
    device.start();
    poll_until(&mut host, &mut events, |h| h.device_mode().is_some());
    assert_eq!(host.device_mode(), Some(SensorMode::Real));

    for _ in 0..4 {
        scale.push_grams(&[180.0; 5], SF);
        device.tick();
    }
    poll_until(&mut host, &mut events, |h| h.status() == AnalysisStatus::Complete);
    let session = host.session().unwrap();
    let result = session.result.clone().unwrap();
    assert_eq!(result.food_name, "apple");
    assert!((result.weight_grams - 180.0).abs() < 1e-9);
    assert!((result.co2_grams - 90.0).abs() < 1e-9);
    assert!(host.last_reading().is_some_and(|r| r.stable));

    // give the AI_RESULT line time to cross the link
    std::thread::sleep(Duration::from_millis(20));
    scale.push_grams(&[180.0; 5], SF);
    device.tick();
    assert_eq!(device.display_mode(), DisplayMode::ResultFrozen);
    assert_eq!(device.display().shown_result(), Some(&result));

    scale.push_grams(&[0.0; 5], SF);
    device.tick();
    assert_eq!(device.display_mode(), DisplayMode::Live);
    poll_until(&mut host, &mut events, |h| h.status() == AnalysisStatus::Ready);
    assert!(host.session().is_none());

    assert!(events.iter().any(|e| matches!(e, HostEvent::Connected { .. })));
    assert!(events.iter().any(|e| matches!(e, HostEvent::ResultSent { .. })));
    assert!(events.iter().any(|e| matches!(e, HostEvent::SessionCancelled { .. })));
    assert_eq!(host.link_stats().lines_dropped, 0);
}

#[test]
fn connection_failure_and_loss_are_distinct_events() {
    let (opener, link) = loopback("loop0");
    opener.fail_open(true);
    let mut host = host(opener.clone());
    assert!(host.connect(Some("loop0")).is_err());
    let events = host.poll();
    assert!(matches!(events.as_slice(), [HostEvent::ConnectionFailed { .. }]));

    opener.fail_open(false);
    host.connect(Some("loop0")).unwrap();
    link.break_link();
    let mut events = Vec::new();
    poll_until(&mut host, &mut events, |h| {
        h.connection_status() == ConnectionStatus::Lost
    });
    events.extend(host.poll());
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, HostEvent::ConnectionLost))
            .count(),
        1
    );
    assert_ne!(
        HostEvent::ConnectionLost.to_string(),
        HostEvent::ConnectionFailed {
            reason: "x".into()
        }
        .to_string()
    );
}

#[test]
fn manual_request_through_controller() {
    let (opener, _link) = loopback("loop0");
    let mut host = host(opener);
    let id = host.request_classification().unwrap();
    assert_eq!(host.status(), AnalysisStatus::Analyzing);
    let events = host.poll();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, HostEvent::AnalysisStarted { session, auto: false } if *session == id))
    );
    host.reset();
    assert_eq!(host.status(), AnalysisStatus::Ready);
}
