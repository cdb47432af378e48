#![no_main]

use libfuzzer_sys::fuzz_target;
use realtime_protocol::core::packet::Packet;
use realtime_protocol::core::payload::decode_batch;

fuzz_target!(|data: &[u8]| {
    // Polling bodies and single socket frames come straight off the wire
    let _ = decode_batch(data, 1_000_000);
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = Packet::decode_text(text);
    }
});
