//! Codec and content-hash throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use mycel_core::codec;
use mycel_testkit::fixtures::{note_draft, random_payload};

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    for size in [64usize, 4 * 1024, 64 * 1024] {
        let raw = random_payload(size);
        let encoded = codec::encode(&raw).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &raw, |b, raw| {
            b.iter(|| codec::encode(black_box(raw)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, enc| {
            b.iter(|| codec::decode(black_box(enc)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("validate", size), &encoded, |b, enc| {
            b.iter(|| codec::validate(black_box(enc)).unwrap())
        });
    }
    group.finish();
}

fn bench_entry_id(c: &mut Criterion) {
    let draft = note_draft("bench", &random_payload(1024), 1_736_870_400_000).unwrap();
    c.bench_function("entry_id/1KiB", |b| {
        b.iter(|| black_box(&draft).compute_id().unwrap())
    });
}

criterion_group!(benches, bench_codec, bench_entry_id);
criterion_main!(benches);
