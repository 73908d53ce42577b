//! Transport lifecycle over the in-memory loopback link.

use std::time::{Duration, Instant};

use ecoscale_core::mocks::{LoopbackDevice, LoopbackOpener, loopback};
use ecoscale_core::{
    ConnectionStatus, DeviceSignature, Inbound, LinkSettings, ProtocolMessage, Transport,
    TransportError,
};
use ecoscale_traits::LineIo;

fn settings() -> LinkSettings {
    LinkSettings {
        read_timeout: Duration::from_millis(10),
        ..LinkSettings::default()
    }
}

fn connected() -> (Transport<LoopbackOpener>, LoopbackDevice) {
    let (opener, device) = loopback("loop0");
    let mut t = Transport::new(opener, settings());
    t.connect(Some("loop0")).expect("connect");
    (t, device)
}

fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Some(v) = f() {
            return v;
        }
        assert!(Instant::now() < deadline, "timed out waiting");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn collect(t: &Transport<LoopbackOpener>, n: usize) -> Vec<Inbound> {
    let mut out = Vec::new();
    wait_for(|| {
        while let Some(item) = t.read_next() {
            out.push(item);
        }
        (out.len() >= n).then_some(())
    });
    out
}

#[test]
fn read_next_is_empty_without_traffic() {
    let (t, _device) = connected();
    assert_eq!(t.read_next(), None);
    assert_eq!(t.status(), ConnectionStatus::Connected);
    assert_eq!(t.port(), Some("loop0"));
}

#[test]
fn weight_line_yields_message_and_record() {
    let (t, mut device) = connected();
    device.send_line("WEIGHT:150.5:STABLE").unwrap();
    let items = collect(&t, 2);
    assert_eq!(
        items[0],
        Inbound::Message(ProtocolMessage::Weight {
            grams: 150.5,
            stable: true
        })
    );
    let Inbound::Weight(rec) = &items[1] else {
        panic!("expected weight record, got {:?}", items[1]);
    };
    assert!((rec.grams - 150.5).abs() < 1e-9);
    assert!(rec.stable);
    assert_eq!(t.stats().weight_records, 1);
}

#[test]
fn malformed_line_is_dropped_and_reader_keeps_going() {
    let (t, device) = connected();
    device.write_raw(b"WEIGHT:abc:STABLE\nWEIGHT:12.5:CHANGING\n");
    let items = collect(&t, 2);
    assert_eq!(
        items[0],
        Inbound::Message(ProtocolMessage::Weight {
            grams: 12.5,
            stable: false
        })
    );
    let stats = t.stats();
    assert_eq!(stats.lines_received, 2);
    assert_eq!(stats.lines_dropped, 1);
    assert_eq!(t.status(), ConnectionStatus::Connected);
}

#[test]
fn partial_lines_are_reassembled() {
    let (t, device) = connected();
    device.write_raw(b"STATUS:READY:MO");
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(t.read_next(), None);
    device.write_raw(b"DE:SIMULATION:WEIGHT:0.0\r\n");
    let items = collect(&t, 1);
    assert!(matches!(
        items[0],
        Inbound::Message(ProtocolMessage::Status { .. })
    ));
}

#[test]
fn overlong_line_is_discarded() {
    let (t, device) = connected();
    let mut junk = vec![b'x'; 600];
    junk.push(b'\n');
    device.write_raw(&junk);
    device.write_raw(b"WEIGHT:1.0:STABLE\n");
    let items = collect(&t, 2);
    assert!(matches!(items[0], Inbound::Message(ProtocolMessage::Weight { .. })));
    assert_eq!(t.stats().lines_dropped, 1);
}

#[test]
fn send_terminates_line() {
    let (mut t, mut device) = connected();
    t.send(&ProtocolMessage::Weight {
        grams: 1.0,
        stable: false,
    })
    .unwrap();
    let line = wait_for(|| device.poll_line());
    assert_eq!(line, "WEIGHT:1.0:CHANGING");
}

#[test]
fn probe_finds_port_by_signature() {
    let (opener, _device) = loopback("ttyACM7");
    let mut t = Transport::new(opener, settings());
    assert_eq!(t.connect(None).unwrap(), "ttyACM7");
    assert_eq!(t.opener().opens(), 1);
}

#[test]
fn probe_without_match_fails_cleanly() {
    let (opener, _device) = loopback("ttyACM7");
    let mut t = Transport::new(
        opener,
        LinkSettings {
            signature: DeviceSignature {
                usb_vid: Some(0x1234),
                descriptions: vec!["arduino".into()],
            },
            ..settings()
        },
    );
    assert_eq!(t.connect(None), Err(TransportError::NoPort));
    assert_eq!(t.status(), ConnectionStatus::Disconnected);
    assert_eq!(t.opener().opens(), 0);
}

#[test]
fn open_failure_leaves_link_down() {
    let (opener, _device) = loopback("loop0");
    opener.fail_open(true);
    let mut t = Transport::new(opener, settings());
    let err = t.connect(Some("loop0")).unwrap_err();
    assert!(matches!(err, TransportError::Open { ref port, .. } if port == "loop0"));
    assert_eq!(t.status(), ConnectionStatus::Disconnected);
    assert_eq!(
        t.send(&ProtocolMessage::Unrecognized("x".into())),
        Err(TransportError::NotConnected)
    );
}

#[test]
fn write_failure_is_reported_not_raised() {
    let (mut t, _device) = connected();
    t.opener().fail_writes(true);
    let err = t
        .send(&ProtocolMessage::Weight {
            grams: 2.0,
            stable: true,
        })
        .unwrap_err();
    assert!(matches!(err, TransportError::Write(_)));
    assert_eq!(t.status(), ConnectionStatus::Connected);
}

#[test]
fn hard_read_error_marks_link_lost_and_reconnect_recovers() {
    let (mut t, mut device) = connected();
    device.break_link();
    wait_for(|| (t.status() == ConnectionStatus::Lost).then_some(()));

    t.connect(Some("loop0")).unwrap();
    assert_eq!(t.status(), ConnectionStatus::Connected);
    device.send_line("WEIGHT:5.0:STABLE").unwrap();
    let items = collect(&t, 2);
    assert_eq!(items.len(), 2);
}

#[test]
fn disconnect_is_idempotent() {
    let (mut t, _device) = connected();
    t.disconnect();
    t.disconnect();
    assert_eq!(t.status(), ConnectionStatus::Disconnected);
    assert_eq!(t.port(), None);
}

#[test]
fn repeated_connect_cycles_do_not_hang() {
    let (opener, _device) = loopback("loop0");
    let mut t = Transport::new(opener, settings());
    for _ in 0..10 {
        t.connect(Some("loop0")).unwrap();
        t.disconnect();
    }
    assert_eq!(t.opener().opens(), 10);
}
