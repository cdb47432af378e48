use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use realtime_protocol::core::codec::{Frame, FrameCodec};
use realtime_protocol::core::packet::Packet;
use realtime_protocol::core::payload::{decode_batch, encode_batch};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_polling_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("polling_batch");
    let batch_sizes = [1usize, 16, 256];

    for &count in &batch_sizes {
        let packets: Vec<Packet> = (0..count)
            .map(|i| {
                if i % 4 == 3 {
                    Packet::Binary(Bytes::from(vec![i as u8; 256]))
                } else {
                    Packet::Message(format!(r#"2["message",{i},"payload"]"#))
                }
            })
            .collect();
        let body = encode_batch(&packets);

        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_function(format!("encode_{count}"), |b| {
            b.iter(|| encode_batch(&packets))
        });
        group.bench_function(format!("decode_{count}"), |b| {
            b.iter(|| {
                let decoded = decode_batch(body.as_bytes(), usize::MAX);
                assert!(decoded.is_ok());
            })
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");
    let payload_sizes = [64usize, 4096, 65536];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Frame::Binary(Bytes::from(vec![0u8; size])),
                |frame| {
                    let mut buf = BytesMut::with_capacity(size + 8);
                    FrameCodec::default().encode(frame, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });

        let mut encoded = BytesMut::new();
        FrameCodec::default()
            .encode(Frame::Text("a".repeat(size)), &mut encoded)
            .unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter_batched(
                || encoded.clone(),
                |mut buf| {
                    let frame = FrameCodec::default().decode(&mut buf).unwrap();
                    assert!(frame.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_polling_batch, bench_frame_codec);
criterion_main!(benches);
