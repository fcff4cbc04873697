//! Benchmarks for table build and scan throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use rusttable::{
    CompressionType, FileWriter, Options, ReadOptions, Table, TableBuilder,
};

fn build(path: &std::path::Path, options: Options, count: usize) {
    let file = FileWriter::create(path).unwrap();
    let mut builder = TableBuilder::new(options, file);
    for i in 0..count {
        let key = format!("key_{:08}", i);
        let value = format!("value_{:08}", i);
        builder.add(key.as_bytes(), value.as_bytes()).unwrap();
    }
    builder.finish().unwrap();
}

/// Benchmark building tables of increasing size.
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for size in [1000, 10000, 100000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || TempDir::new().unwrap(),
                |dir| {
                    build(&dir.path().join("bench.tbl"), Options::default(), size);
                    black_box(())
                },
            );
        });
    }

    group.finish();
}

/// Benchmark building with each compression codec.
fn bench_build_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_compression");
    group.throughput(Throughput::Elements(10000));

    for (name, compression) in [
        ("none", CompressionType::None),
        ("snappy", CompressionType::Snappy),
        ("lz4", CompressionType::Lz4),
    ] {
        group.bench_function(name, |b| {
            b.iter_with_setup(
                || TempDir::new().unwrap(),
                |dir| {
                    let options = Options {
                        compression,
                        ..Options::default()
                    };
                    build(&dir.path().join("bench.tbl"), options, 10000);
                    black_box(())
                },
            );
        });
    }

    group.finish();
}

/// Benchmark a full sequential scan through the two-level iterator.
fn bench_scan(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.tbl");
    build(&path, Options::default(), 100000);
    let table = Table::open(&path, Options::default()).unwrap();

    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(100000));
    group.bench_function("sequential", |b| {
        b.iter(|| {
            let mut iter = table.iter(ReadOptions::default());
            let mut count = 0u64;
            iter.seek_to_first();
            while iter.valid() {
                count += iter.key().len() as u64;
                iter.next();
            }
            black_box(count)
        });
    });

    group.finish();
}

/// Benchmark random seeks.
fn bench_seek(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.tbl");
    build(&path, Options::default(), 100000);
    let table = Table::open(&path, Options::default()).unwrap();

    // Pseudo-random but stable probe order.
    let keys: Vec<String> = (0..1000)
        .map(|i| format!("key_{:08}", (i * 7919) % 100000))
        .collect();

    let mut group = c.benchmark_group("seek");
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("random", |b| {
        b.iter(|| {
            let mut iter = table.iter(ReadOptions::default());
            for key in &keys {
                iter.seek(key.as_bytes());
                assert!(iter.valid());
            }
            black_box(())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_build,
    bench_build_compression,
    bench_scan,
    bench_seek
);
criterion_main!(benches);
