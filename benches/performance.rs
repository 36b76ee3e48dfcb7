//! Performance benchmarks for portsweep

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use portsweep::{
    output::ResultFlusher,
    scanner::create_batches,
    MalformedLinePolicy, TargetParser,
};
use std::net::IpAddr;
use tokio::runtime::Runtime;

/// Benchmark CIDR expansion
fn bench_target_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("target_expansion");
    let parser = TargetParser::new(65536, MalformedLinePolicy::Reject);

    for prefix in [24u8, 20, 16] {
        let cidr = format!("10.0.0.0/{}", prefix);
        group.bench_with_input(BenchmarkId::new("ipv4", prefix), &cidr, |b, cidr| {
            b.iter(|| black_box(parser.expand(black_box(cidr)).unwrap()))
        });
    }

    group.bench_function("ipv6_112", |b| {
        b.iter(|| black_box(parser.expand(black_box("2001:db8::/112")).unwrap()))
    });

    let multi_line: String = (0..64).map(|i| format!("10.{}.0.0/24\n", i)).collect();
    group.bench_function("multi_line_64x24", |b| {
        b.iter(|| black_box(parser.expand(black_box(&multi_line)).unwrap()))
    });

    group.finish();
}

/// Benchmark batch creation
fn bench_batch_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_creation");
    let targets = TargetParser::default().expand("10.0.0.0/16").unwrap();

    for batch_size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("slash16", batch_size), &batch_size, |b, &size| {
            b.iter(|| black_box(create_batches(black_box(&targets), size)))
        });
    }

    group.finish();
}

/// Benchmark chunked flushing into an in-memory sink
fn bench_flushing(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let found: Vec<IpAddr> = TargetParser::default().expand("10.0.0.0/22").unwrap();

    c.bench_function("flush_1024_by_20", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut sink: Vec<String> = Vec::new();
                let mut flusher = ResultFlusher::new(20);
                for &address in &found {
                    flusher.accumulate(address, &mut sink).await.unwrap();
                }
                black_box(flusher.finalize(&mut sink).await.unwrap())
            })
        })
    });
}

criterion_group!(benches, bench_target_expansion, bench_batch_creation, bench_flushing);
criterion_main!(benches);
