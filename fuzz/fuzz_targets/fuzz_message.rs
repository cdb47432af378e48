#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use realtime_protocol::protocol::binary::AttachmentBuffer;
use realtime_protocol::protocol::message::Message;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(message) = Message::decode(text) else {
        return;
    };

    // Feed placeholder packets their attachments to exercise resolution
    let mut buffer = AttachmentBuffer::new();
    if let Ok(None) = buffer.accept(message) {
        for _ in 0..64 {
            if !buffer.is_pending() || buffer.push(Bytes::from_static(b"fuzz")).is_err() {
                break;
            }
        }
    }
});
