use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use realtime_protocol::protocol::binary::AttachmentBuffer;
use realtime_protocol::protocol::data::Data;
use realtime_protocol::protocol::message::Message;

fn sample_args() -> Vec<Data> {
    vec![
        Data::from(1i64),
        Data::from("2"),
        Data::from(serde_json::json!({"3": [false], "nested": {"k": "v"}})),
    ]
}

#[allow(clippy::unwrap_used)]
fn bench_message_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_codec");

    group.bench_function("encode_event", |b| {
        b.iter_batched(
            sample_args,
            |args| {
                let (message, _) = Message::event("/custom", "message", args, Some(456));
                message.encode()
            },
            BatchSize::SmallInput,
        )
    });

    let (message, _) = Message::event("/custom", "message", sample_args(), Some(456));
    let encoded = message.encode();
    group.bench_function("decode_event", |b| {
        b.iter(|| Message::decode(&encoded).unwrap())
    });

    let raw = r#"52-789["upload",{"_placeholder":true,"num":0},{"_placeholder":true,"num":1}]"#;
    let attachments = [
        Bytes::from(vec![1u8; 4096]),
        Bytes::from(vec![2u8; 4096]),
    ];
    group.bench_function("reassemble_binary_event", |b| {
        b.iter(|| {
            let mut buffer = AttachmentBuffer::new();
            let message = Message::decode(raw).unwrap();
            assert!(buffer.accept(message).unwrap().is_none());
            let mut ready = None;
            for bytes in &attachments {
                ready = buffer.push(bytes.clone()).unwrap();
            }
            assert!(ready.is_some());
        })
    });

    group.finish();
}

criterion_group!(benches, bench_message_codec);
criterion_main!(benches);
