//! End-to-end tests: build a table file, then read it back through the
//! two-level iterator and point lookups.

use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;

use rusttable::{
    BloomFilterPolicy, CompressionType, FileWriter, Options, ReadOptions, Table, TableBuilder,
};

fn entries(count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|i| {
            (
                format!("key_{:05}", i).into_bytes(),
                format!("value_{:05}_{}", i, "x".repeat(i % 29)).into_bytes(),
            )
        })
        .collect()
}

fn build_table(path: &Path, options: Options, entries: &[(Vec<u8>, Vec<u8>)]) -> u64 {
    let file = FileWriter::create(path).unwrap();
    let mut builder = TableBuilder::new(options, file);
    for (key, value) in entries {
        builder.add(key, value).unwrap();
    }
    builder.finish().unwrap();
    assert_eq!(builder.num_entries(), entries.len() as u64);
    builder.file_size()
}

fn scan_forward(table: &Table) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut iter = table.iter(ReadOptions::default());
    let mut result = Vec::new();
    iter.seek_to_first();
    while iter.valid() {
        result.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    iter.status().unwrap();
    result
}

fn scan_backward(table: &Table) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut iter = table.iter(ReadOptions::default());
    let mut result = Vec::new();
    iter.seek_to_last();
    while iter.valid() {
        result.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.prev();
    }
    iter.status().unwrap();
    result.reverse();
    result
}

#[test]
fn roundtrip_small_blocks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tbl");

    let data = entries(1000);
    let options = Options {
        block_size: 256,
        ..Options::default()
    };
    let file_size = build_table(&path, options.clone(), &data);
    assert_eq!(file_size, std::fs::metadata(&path).unwrap().len());

    let table = Table::open(&path, options).unwrap();
    assert_eq!(scan_forward(&table), data);
    assert_eq!(scan_backward(&table), data);
}

#[test]
fn roundtrip_every_compression() {
    for compression in [
        CompressionType::None,
        CompressionType::Snappy,
        CompressionType::Lz4,
    ] {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tbl");

        let data = entries(500);
        let options = Options {
            block_size: 512,
            compression,
            ..Options::default()
        };
        build_table(&path, options.clone(), &data);

        let table = Table::open(&path, options).unwrap();
        assert_eq!(scan_forward(&table), data, "codec {:?}", compression);
        assert_eq!(scan_backward(&table), data, "codec {:?}", compression);
    }
}

#[test]
fn roundtrip_with_filter() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tbl");

    let data = entries(800);
    let options = Options {
        block_size: 128,
        filter_policy: Some(Arc::new(BloomFilterPolicy::new(10))),
        ..Options::default()
    };
    build_table(&path, options.clone(), &data);

    let table = Table::open(&path, options).unwrap();
    assert_eq!(scan_forward(&table), data);

    // The filter never produces a false negative.
    let read_options = ReadOptions::default();
    for (key, value) in &data {
        assert!(table.may_contain(key).unwrap());
        assert_eq!(
            table.get(key, &read_options).unwrap().as_deref(),
            Some(value.as_slice())
        );
    }
}

#[test]
fn roundtrip_empty_table() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tbl");

    build_table(&path, Options::default(), &[]);

    let table = Table::open(&path, Options::default()).unwrap();
    assert!(scan_forward(&table).is_empty());
    assert!(scan_backward(&table).is_empty());

    let mut iter = table.iter(ReadOptions::default());
    iter.seek(b"anything");
    assert!(!iter.valid());
    assert!(iter.status().is_ok());

    assert!(table
        .get(b"anything", &ReadOptions::default())
        .unwrap()
        .is_none());
}

#[test]
fn roundtrip_single_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tbl");

    build_table(
        &path,
        Options::default(),
        &[(b"only".to_vec(), b"one".to_vec())],
    );

    let table = Table::open(&path, Options::default()).unwrap();
    assert_eq!(
        scan_forward(&table),
        vec![(b"only".to_vec(), b"one".to_vec())]
    );

    let mut iter = table.iter(ReadOptions::default());
    iter.seek_to_last();
    assert!(iter.valid());
    assert_eq!(iter.key(), b"only");
    iter.prev();
    assert!(!iter.valid());
}

#[test]
fn seek_positions_at_smallest_key_not_less_than_target() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tbl");

    let data = entries(1000);
    let options = Options {
        block_size: 128,
        ..Options::default()
    };
    build_table(&path, options.clone(), &data);

    let table = Table::open(&path, options).unwrap();
    let mut iter = table.iter(ReadOptions::default());

    // Exact targets hit their entry.
    for (key, value) in data.iter().step_by(97) {
        iter.seek(key);
        assert!(iter.valid());
        assert_eq!(iter.key(), key.as_slice());
        assert_eq!(iter.value().as_ref(), value.as_slice());
    }

    // A target between two keys lands on the greater one.
    iter.seek(b"key_00123a");
    assert!(iter.valid());
    assert_eq!(iter.key(), b"key_00124");

    // Before the first key.
    iter.seek(b"a");
    assert!(iter.valid());
    assert_eq!(iter.key(), b"key_00000");

    // Past the last key.
    iter.seek(b"zzz");
    assert!(!iter.valid());
    assert!(iter.status().is_ok());
}

#[test]
fn seek_then_scan_spans_blocks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tbl");

    let data = entries(300);
    let options = Options {
        block_size: 64,
        ..Options::default()
    };
    build_table(&path, options.clone(), &data);

    let table = Table::open(&path, options).unwrap();
    let mut iter = table.iter(ReadOptions::default());

    iter.seek(b"key_00150");
    let mut seen = Vec::new();
    while iter.valid() {
        seen.push(iter.key().to_vec());
        iter.next();
    }
    assert_eq!(seen.len(), 150);
    assert_eq!(seen.first().unwrap().as_slice(), b"key_00150");
    assert_eq!(seen.last().unwrap().as_slice(), b"key_00299");

    // Walk backward from the seek point as well.
    iter.seek(b"key_00150");
    iter.prev();
    assert!(iter.valid());
    assert_eq!(iter.key(), b"key_00149");
}

#[test]
fn compression_change_mid_build_leaves_blocks_readable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tbl");

    let data = entries(400);
    let file = FileWriter::create(&path).unwrap();
    let options = Options {
        block_size: 256,
        compression: CompressionType::None,
        ..Options::default()
    };
    let mut builder = TableBuilder::new(options.clone(), file);

    for (i, (key, value)) in data.iter().enumerate() {
        if i == 200 {
            // Blocks written before this keep their original tag.
            builder
                .change_options(Options {
                    block_size: 256,
                    compression: CompressionType::Snappy,
                    ..Options::default()
                })
                .unwrap();
        }
        builder.add(key, value).unwrap();
    }
    builder.finish().unwrap();

    let table = Table::open(&path, options).unwrap();
    assert_eq!(scan_forward(&table), data);
}

#[test]
fn forward_and_backward_visit_each_entry_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tbl");

    let data = entries(257);
    let options = Options {
        block_size: 100,
        ..Options::default()
    };
    build_table(&path, options.clone(), &data);

    let table = Table::open(&path, options).unwrap();

    let forward = scan_forward(&table);
    assert_eq!(forward.len(), data.len());
    assert_eq!(forward, data);

    let backward = scan_backward(&table);
    assert_eq!(backward, data);
}
