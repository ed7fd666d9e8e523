use std::sync::Arc;

use aquifer::{AsyncFile, AsyncFileError};

fn temp_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

/// Installs a subscriber that prints through the test harness's captured
/// output, so `tracing::debug!`/`tracing::warn!` calls made by the crate
/// under test (lifecycle logging, `synch` failure warnings) are visible
/// with `cargo test -- --nocapture`. Idempotent: only the first test to
/// run in a given process actually installs one.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("aquifer=debug").try_init();
}

#[tokio_uring::test]
async fn round_trip_through_close_and_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "scenario1.dat");
    let file = AsyncFile::new(&path);

    file.create().await.unwrap();
    let start = file.allocate_space(4096).await.unwrap();
    assert_eq!(start, 0);

    let (_, result) = file.write_at(0, vec![0xABu8; 4096]).await;
    result.unwrap();

    file.synch().await;
    file.close().await.unwrap();
    file.open().await.unwrap();

    let (buf, result) = file.read_at(0, vec![0u8; 4096], true).await;
    result.unwrap();
    assert_eq!(buf, vec![0xABu8; 4096]);
}

#[tokio_uring::test]
async fn concurrent_allocations_are_disjoint() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "scenario2.dat");
    let file = Arc::new(AsyncFile::new(&path));
    file.create().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..64 {
        let file = Arc::clone(&file);
        handles.push(tokio_uring::spawn(async move { file.allocate_space(1024).await.unwrap() }));
    }
    let mut starts = Vec::new();
    for h in handles {
        starts.push(h.await.unwrap());
    }
    starts.sort_unstable();
    let expected: Vec<u64> = (0..64).map(|i| i * 1024).collect();
    assert_eq!(starts, expected);
    assert_eq!(file.file_size(), 65536);
}

#[tokio_uring::test]
async fn allocation_past_threshold_is_zero_filled() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "scenario3.dat");
    let file = AsyncFile::new(&path);
    file.create().await.unwrap();

    let two_mib = 2 * 1024 * 1024;
    file.allocate_space(two_mib).await.unwrap();

    let (buf, result) = file.read_at(1024 * 1024 + 17, vec![0xFFu8; 32], true).await;
    result.unwrap();
    assert!(buf.iter().all(|&b| b == 0), "bytes past the committed threshold must read back as zero");
}

#[tokio_uring::test]
async fn write_batch_round_trips_both_pairs() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "scenario4.dat");
    let file = Arc::new(AsyncFile::new(&path));
    file.create().await.unwrap();
    file.allocate_space(200).await.unwrap();

    let pairs = vec![(0u64, vec![1u8; 10]), (100u64, vec![2u8; 10])];
    let io_result = Arc::clone(&file).write_batch(pairs).await.unwrap();
    io_result.wait().await.unwrap();

    let (buf0, r0) = file.read_at(0, vec![0u8; 10], true).await;
    r0.unwrap();
    assert_eq!(buf0, vec![1u8; 10]);

    let (buf1, r1) = file.read_at(100, vec![0u8; 10], true).await;
    r1.unwrap();
    assert_eq!(buf1, vec![2u8; 10]);
}

#[tokio_uring::test]
async fn concurrent_same_offset_writes_last_writer_wins() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "scenario5.dat");
    let file = Arc::new(AsyncFile::new(&path));
    file.create().await.unwrap();
    file.allocate_space(64).await.unwrap();

    let a = Arc::clone(&file);
    let b = Arc::clone(&file);
    let h1 = tokio_uring::spawn(async move { a.write_at(0, vec![1u8; 64]).await.1 });
    let h2 = tokio_uring::spawn(async move { b.write_at(0, vec![2u8; 64]).await.1 });
    h1.await.unwrap().unwrap();
    h2.await.unwrap().unwrap();

    file.synch().await;

    let (buf, result) = file.read_at(0, vec![0u8; 64], true).await;
    result.unwrap();
    assert!(
        buf.iter().all(|&b| b == 1) || buf.iter().all(|&b| b == 2),
        "last writer wins, no torn content expected for a small aligned write"
    );
}

#[tokio_uring::test]
async fn shrink_resets_size_and_requires_reallocation() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "scenario6.dat");
    let file = AsyncFile::new(&path);
    file.create().await.unwrap();
    file.allocate_space(100).await.unwrap();
    let (_, result) = file.write_at(0, vec![1u8; 100]).await;
    result.unwrap();

    file.shrink(100).await.unwrap();
    assert_eq!(file.file_size(), 0);

    // No reopen here: shrink only truncates the physical file to
    // `new_size + HEADER_SIZE` and resets the in-memory counters, so a
    // reopen would re-derive `size` from that (unchanged) physical length
    // and observe 100 again. The handle stays open, per spec §8 scenario 6.
    let (_, result) = file.read_at(0, vec![0u8; 100], true).await;
    assert!(matches!(result, Err(AsyncFileError::Range { .. })));
}

#[tokio_uring::test]
async fn read_at_size_is_out_of_range() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "boundary1.dat");
    let file = AsyncFile::new(&path);
    file.create().await.unwrap();
    file.allocate_space(10).await.unwrap();

    let (_, result) = file.read_at(10, vec![0u8; 1], true).await;
    assert!(matches!(result, Err(AsyncFileError::Range { .. })));
}

#[tokio_uring::test]
async fn allocation_threshold_boundary() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "boundary2.dat");
    let file = AsyncFile::new(&path);
    file.create().await.unwrap();

    // Exactly at the threshold: the gap after this allocation is still
    // <= ALLOCATION_THRESHOLD, so committed_size stays behind size.
    file.allocate_space(aquifer::ALLOCATION_THRESHOLD).await.unwrap();
    assert_eq!(file.file_size(), aquifer::ALLOCATION_THRESHOLD);

    // One byte further crosses it and forces a physical commit up to the
    // new size.
    file.allocate_space(1).await.unwrap();
    let (buf, result) = file
        .read_at(aquifer::ALLOCATION_THRESHOLD - 1, vec![0xFFu8; 2], true)
        .await;
    result.unwrap();
    assert_eq!(buf, vec![0u8; 2]);
}

#[tokio_uring::test]
async fn rename_preserves_content_and_size() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let original = temp_path(&dir, "before.dat");
    let renamed = temp_path(&dir, "after.dat");
    let file = AsyncFile::new(&original);
    file.create().await.unwrap();
    file.allocate_space(16).await.unwrap();
    let (_, result) = file.write_at(0, vec![9u8; 16]).await;
    result.unwrap();

    file.rename_to(&renamed).await.unwrap();
    assert_eq!(file.file_size(), 16);
    assert_eq!(file.name().await.unwrap(), "after.dat");

    let (buf, result) = file.read_at(0, vec![0u8; 16], true).await;
    result.unwrap();
    assert_eq!(buf, vec![9u8; 16]);
}

#[tokio_uring::test]
async fn double_create_is_a_state_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "double.dat");
    let file = AsyncFile::new(&path);
    file.create().await.unwrap();
    let err = file.create().await.unwrap_err();
    assert!(matches!(err, AsyncFileError::State { .. }));
}

#[tokio_uring::test]
async fn operations_on_a_closed_file_fail_with_state_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "closed.dat");
    let file = AsyncFile::new(&path);
    file.create().await.unwrap();
    file.close().await.unwrap();

    let (_, result) = file.read_at(0, vec![0u8; 1], true).await;
    assert!(matches!(result, Err(AsyncFileError::State { .. })));
}

#[tokio_uring::test]
async fn synch_clears_the_dirty_counter_set_by_create() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "synch.dat");
    let file = AsyncFile::new(&path);
    file.create().await.unwrap();
    // create()'s header zero-fill marks the file dirty once; this synch
    // flushes it, and a second call with nothing new written is a true
    // no-op per invariant 5.
    file.synch().await;
    file.synch().await;
}

proptest::proptest! {
    #[test]
    fn allocation_sizes_sum_to_total_growth(sizes in proptest::collection::vec(1u64..=4096, 1..20)) {
        tokio_uring::start(async {
            init_tracing();
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("prop.dat");
            let file = AsyncFile::new(&path);
            file.create().await.unwrap();

            let mut total = 0u64;
            for n in &sizes {
                file.allocate_space(*n).await.unwrap();
                total += n;
            }
            assert_eq!(file.file_size(), total);
        });
    }
}
