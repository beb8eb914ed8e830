//! Fanout benchmarks: encoding a message once and queueing it for every
//! local member of its group.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use switchboard_bench::populated_hub;
use switchboard_protocol::{ConnectionId, GroupMessage};

fn message(text_len: usize) -> GroupMessage {
    GroupMessage {
        message: "x".repeat(text_len),
        group_id: "g0".to_string(),
        client_id: ConnectionId::new("bench-sender"),
        user_id: "bench".to_string(),
    }
}

fn bench_distribute(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("distribute");

    for members in [1, 10, 100, 1000] {
        let hub = runtime.block_on(populated_hub(members, "g0"));
        let message = message(64);

        group.throughput(Throughput::Elements(members as u64));
        group.bench_with_input(BenchmarkId::from_parameter(members), &message, |b, message| {
            b.iter(|| hub.distribute(black_box(message.clone())));
        });

        hub.shutdown();
    }

    group.finish();
}

fn bench_message_size(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let hub = runtime.block_on(populated_hub(100, "g0"));
    let mut group = c.benchmark_group("distribute_size");

    for size in [16, 1024, 16 * 1024] {
        let message = message(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| hub.distribute(black_box(message.clone())));
        });
    }

    group.finish();
    hub.shutdown();
}

criterion_group!(benches, bench_distribute, bench_message_size);
criterion_main!(benches);
