#![no_main]
use ecoscale_core::protocol::{ProtocolMessage, decode, encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let msg = decode(&line);
    // Anything that decoded must survive a re-encode and decode to the same kind.
    if !msg.is_unrecognized() {
        let again = decode(&encode(&msg));
        assert_eq!(again.kind(), msg.kind());
    }
    if let ProtocolMessage::Weight { grams, .. } = msg {
        assert!(grams.is_finite());
    }
});
