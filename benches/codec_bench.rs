use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};
use ttt_mesh::core::codec::FrameCodec;
use ttt_mesh::core::framer::{encode, Framer};
use ttt_mesh::protocol::identity::NodeId;
use ttt_mesh::protocol::message::Message;

#[allow(clippy::unwrap_used)]
fn sample_messages() -> Vec<(&'static str, Message)> {
    vec![
        ("greet", Message::Greet),
        ("set", Message::Set { row: 2, col: 1 }),
        ("hello", Message::Hello(NodeId::new("a".repeat(64)).unwrap())),
    ]
}

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");

    for (name, message) in sample_messages() {
        let frame = encode(&message).unwrap();
        group.throughput(Throughput::Bytes(frame.len() as u64));

        group.bench_function(format!("encode_{name}"), |b| {
            b.iter_batched(
                || message.clone(),
                |message| {
                    let mut buf = BytesMut::with_capacity(frame.len());
                    FrameCodec::default().encode(message, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("decode_{name}"), |b| {
            b.iter_batched(
                || BytesMut::from(&frame[..]),
                |mut buf| {
                    let decoded = FrameCodec::default().decode(&mut buf).unwrap();
                    assert!(matches!(decoded, Some(Ok(_))));
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_chunked_stream(c: &mut Criterion) {
    let mut stream = Vec::new();
    for row in 0..3u8 {
        for col in 0..3u8 {
            stream.extend(encode(&Message::Set { row, col }).unwrap());
        }
    }

    let mut group = c.benchmark_group("framer_stream");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    for chunk in [1usize, 7, 64] {
        group.bench_function(format!("chunks_of_{chunk}b"), |b| {
            b.iter(|| {
                let mut framer = Framer::default();
                let mut count = 0;
                for piece in stream.chunks(chunk) {
                    count += framer.push(piece).len();
                }
                assert_eq!(count, 9);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_frame_encode_decode, bench_chunked_stream);
criterion_main!(benches);
