//! Property-based tests using proptest
//!
//! These tests validate codec invariants across a wide range of randomly
//! generated inputs: decoders never panic, batches keep packet order and
//! kind, and binary arguments survive placeholder extraction.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use realtime_protocol::core::codec::{Frame, FrameCodec};
use realtime_protocol::core::packet::Packet;
use realtime_protocol::core::payload::{decode_batch, encode_batch};
use realtime_protocol::protocol::data::{deconstruct, Data};
use realtime_protocol::protocol::message::{Message, MessageKind};
use tokio_util::codec::{Decoder, Encoder};

fn packet_strategy() -> impl Strategy<Value = Packet> {
    prop_oneof![
        Just(Packet::Close),
        Just(Packet::Noop),
        Just(Packet::Upgrade),
        proptest::option::of("[a-z]{1,8}").prop_map(Packet::Ping),
        proptest::option::of("[a-z]{1,8}").prop_map(Packet::Pong),
        "[^\u{1e}]{0,64}".prop_map(Packet::Message),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(|b| Packet::Binary(Bytes::from(b))),
    ]
}

// Property: text packet decoding never panics
proptest! {
    #[test]
    fn prop_packet_decode_never_panics(raw in "\\PC{0,64}") {
        let _ = Packet::decode_text(&raw);
    }
}

// Property: a polling batch keeps every packet, in order
proptest! {
    #[test]
    fn prop_batch_preserves_order(packets in prop::collection::vec(packet_strategy(), 1..16)) {
        let body = encode_batch(&packets);
        let decoded = decode_batch(body.as_bytes(), usize::MAX).expect("own batch decodes");
        prop_assert_eq!(decoded, packets);
    }
}

// Property: bodies over the limit are always rejected as oversized
proptest! {
    #[test]
    fn prop_oversized_body_rejected(len in 11usize..256) {
        let body = "4".repeat(len);
        let err = decode_batch(body.as_bytes(), 10).unwrap_err();
        prop_assert_eq!(err.status_code(), 413);
    }
}

// Property: application packet decoding never panics
proptest! {
    #[test]
    fn prop_message_decode_never_panics(raw in "[0-6]?[0-9/,\\-a-z\\[\\]{}\":]{0,48}") {
        let _ = Message::decode(&raw);
    }
}

// Property: an encoded event decodes to the same namespace, id and name
proptest! {
    #[test]
    fn prop_event_keeps_routing_fields(
        nsp in "(/|/[a-z]{1,8})",
        event in "[a-z][a-z\\-]{0,12}",
        id in proptest::option::of(0u64..1_000_000),
        args in prop::collection::vec("[ -~]{0,16}", 0..4),
    ) {
        let args: Vec<Data> = args.into_iter().map(Data::from).collect();
        let (message, attachments) = Message::event(&nsp, &event, args, id);
        prop_assert!(attachments.is_empty());

        let decoded = Message::decode(&message.encode()).expect("own event decodes");
        prop_assert_eq!(decoded.kind, MessageKind::Event);
        prop_assert_eq!(&decoded.namespace, &nsp);
        prop_assert_eq!(decoded.id, id);
        prop_assert_eq!(decoded.event_name(), Some(event.as_str()));
    }
}

// Property: placeholders resolve back to the original binary leaves
proptest! {
    #[test]
    fn prop_binary_leaves_survive_placeholders(
        buffers in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..6),
    ) {
        let data = Data::Array(
            buffers
                .iter()
                .map(|b| Data::Binary(Bytes::from(b.clone())))
                .collect(),
        );
        let (value, attachments) = deconstruct(data.clone());
        prop_assert_eq!(attachments.len(), buffers.len());

        let resolved = Data::resolve(value, &attachments).expect("own placeholders resolve");
        prop_assert_eq!(resolved, data);
    }
}

// Property: frame codec reproduces each frame from a byte stream
proptest! {
    #[test]
    fn prop_frame_codec_splits_stream(texts in prop::collection::vec("\\PC{0,32}", 1..8)) {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        for t in &texts {
            codec.encode(Frame::Text(t.clone()), &mut buf).expect("encode");
        }
        for t in &texts {
            let frame = codec.decode(&mut buf).expect("decode").expect("complete frame");
            prop_assert_eq!(frame, Frame::Text(t.clone()));
        }
        prop_assert!(buf.is_empty());
    }
}
