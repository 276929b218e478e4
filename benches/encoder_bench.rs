//! Criterion benchmark untuk Datagram Encoder
//!
//! Run dengan: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dory_client::protocol::{Addressing, DatagramEncoder, DatagramView, Message};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let encoder = DatagramEncoder::new();

    for payload_size in [64usize, 1024, 64 * 1024].iter() {
        let value = vec![0xABu8; *payload_size];
        group.throughput(Throughput::Bytes(*payload_size as u64));

        group.bench_function(format!("any_partition_{}", payload_size), |b| {
            b.iter(|| {
                let msg = Message::new("orders", black_box(1_700_000_000_000), &value);
                black_box(encoder.encode(Addressing::AnyPartition, &msg))
            });
        });

        group.bench_function(format!("partition_key_{}", payload_size), |b| {
            b.iter(|| {
                let msg = Message::new("orders", 1_700_000_000_000, &value).with_key(b"user-42");
                black_box(encoder.encode(Addressing::PartitionKey(black_box(7)), &msg))
            });
        });
    }

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let encoder = DatagramEncoder::new();

    for payload_size in [64usize, 1024, 64 * 1024].iter() {
        let value = vec![0xCDu8; *payload_size];
        let dg = encoder
            .encode(Addressing::AnyPartition, &Message::new("orders", 1, &value))
            .unwrap();
        group.throughput(Throughput::Bytes(dg.len() as u64));

        group.bench_function(format!("view_{}", payload_size), |b| {
            b.iter(|| black_box(DatagramView::parse(black_box(dg.as_bytes()))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_parse);
criterion_main!(benches);
