//! Decoder and table benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::{Path, PathBuf};
use treewatch_core::EventKind;
use watcher::codec::{EventCodec, HEADER_SIZE};
use watcher::source::InotifyMask;
use watcher::table::{WatchEntry, WatchTable};

/// Build a buffer of `count` records with short names
fn record_stream(count: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(count * (HEADER_SIZE + 16));
    for i in 0..count {
        let name = format!("file_{:05}", i % 100_000);
        let name_len = (name.len() + 1).div_ceil(HEADER_SIZE) * HEADER_SIZE;
        bytes.extend_from_slice(&1i32.to_ne_bytes());
        bytes.extend_from_slice(&InotifyMask::MODIFY.bits().to_ne_bytes());
        bytes.extend_from_slice(&0u32.to_ne_bytes());
        bytes.extend_from_slice(&(name_len as u32).to_ne_bytes());
        let start = bytes.len();
        bytes.extend_from_slice(name.as_bytes());
        bytes.resize(start + name_len, 0);
    }
    bytes
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for count in [64, 1024, 16_384] {
        let stream = record_stream(count);
        group.bench_with_input(BenchmarkId::new("whole_buffer", count), &stream, |b, stream| {
            b.iter(|| {
                let mut codec = EventCodec::new();
                codec.extend(stream);
                black_box(codec.decode_all().unwrap().len())
            });
        });

        // Reads that tear records at an odd boundary
        group.bench_with_input(BenchmarkId::new("torn_reads", count), &stream, |b, stream| {
            b.iter(|| {
                let mut codec = EventCodec::new();
                let mut decoded = 0;
                for chunk in stream.chunks(1000) {
                    codec.extend(chunk);
                    decoded += codec.decode_all().unwrap().len();
                }
                black_box(decoded)
            });
        });
    }

    group.finish();
}

fn bench_rewrite_prefix(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite_prefix");

    for width in [10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(width * width), &width, |b, &width| {
            b.iter_with_setup(
                || {
                    let mut table = WatchTable::new();
                    let mut handle = 0;
                    for i in 0..width {
                        for j in 0..width {
                            handle += 1;
                            let path: PathBuf = format!("/data/d{}/s{}", i, j).into();
                            table
                                .insert(WatchEntry::directory(handle, path, EventKind::ALL, true))
                                .unwrap();
                        }
                    }
                    table
                },
                |mut table| black_box(table.rewrite_prefix(Path::new("/data/d0"), Path::new("/data/moved"))),
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_rewrite_prefix);
criterion_main!(benches);
