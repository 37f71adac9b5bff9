#![no_main]
//! Fuzz target for wire message decoding
//!
//! Feeds arbitrary bytes to the payload decoder: it must never panic, and
//! anything it accepts must re-encode to a payload it accepts again.

use libfuzzer_sys::fuzz_target;

use protocol::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = Message::decode(data) {
        let bytes = msg.encode();
        let again = Message::decode(&bytes).expect("re-encoded message failed to decode");
        assert_eq!(msg, again);
    }
});
