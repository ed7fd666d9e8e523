//! Throughput of `allocate_space`/`write` across the `ALLOCATION_THRESHOLD`
//! boundary — the teacher's `Cargo.toml` declared this bench target
//! (`checkpoint_bench`) without a matching file; this gives it one.

use aquifer::AsyncFile;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

fn allocate_below_threshold(c: &mut Criterion) {
    c.bench_function("allocate_space/below_threshold", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("bench.dat");
                (dir, path)
            },
            |(_dir, path)| {
                tokio_uring::start(async {
                    let file = AsyncFile::new(&path);
                    file.create().await.unwrap();
                    for _ in 0..16 {
                        file.allocate_space(1024).await.unwrap();
                    }
                });
            },
            BatchSize::SmallInput,
        );
    });
}

fn allocate_crossing_threshold(c: &mut Criterion) {
    c.bench_function("allocate_space/crossing_threshold", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("bench.dat");
                (dir, path)
            },
            |(_dir, path)| {
                tokio_uring::start(async {
                    let file = AsyncFile::new(&path);
                    file.create().await.unwrap();
                    file.allocate_space(aquifer::ALLOCATION_THRESHOLD + 1).await.unwrap();
                });
            },
            BatchSize::SmallInput,
        );
    });
}

fn write_throughput(c: &mut Criterion) {
    c.bench_function("write_at/64kb", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("bench.dat");
                (dir, path)
            },
            |(_dir, path)| {
                tokio_uring::start(async {
                    let file = AsyncFile::new(&path);
                    file.create().await.unwrap();
                    file.allocate_space(64 * 1024).await.unwrap();
                    let (_, result) = file.write_at(0, vec![0xABu8; 64 * 1024]).await;
                    result.unwrap();
                });
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, allocate_below_threshold, allocate_crossing_threshold, write_throughput);
criterion_main!(benches);
