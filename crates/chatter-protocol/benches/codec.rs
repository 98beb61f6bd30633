//! Codec benchmarks for chatter-protocol.

use chatter_protocol::{codec, ClientFrame, MessageFrame, MessageId, PresenceEntry, ServerFrame, UserId};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_decode_send(c: &mut Criterion) {
    let frame = ClientFrame::send(UserId::new("64f0c2a1e4b0"), "x".repeat(64));
    let encoded = codec::encode(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("send_64B", |b| {
        b.iter(|| codec::decode::<ClientFrame>(black_box(&encoded)))
    });
    group.finish();
}

fn bench_encode_message(c: &mut Criterion) {
    let frame = ServerFrame::Message(MessageFrame {
        id: MessageId(42),
        sender: UserId::new("alice"),
        recipient: UserId::new("bob"),
        text: "x".repeat(256),
        created_at: 1_700_000_000_000,
    });

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(256));
    group.bench_function("message_256B", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.finish();
}

fn bench_encode_presence(c: &mut Criterion) {
    let online: Vec<PresenceEntry> = (0..1000)
        .map(|i| PresenceEntry {
            user_id: UserId::new(format!("user-{i}")),
            username: format!("name-{i}"),
        })
        .collect();
    let frame = ServerFrame::presence(online);

    c.bench_function("encode_presence_1000", |b| {
        b.iter(|| codec::encode(black_box(&frame)))
    });
}

criterion_group!(
    benches,
    bench_decode_send,
    bench_encode_message,
    bench_encode_presence
);
criterion_main!(benches);
