//! Per-instance configuration, generalizing the `StorageConfig` sketch this
//! crate's teacher left as `todo!()`.

/// Fixed-size opaque prefix reserved at the start of every file, invisible
/// to this crate's address arithmetic. The enclosing subsystem (page cache,
/// WAL) owns this region; this crate never reads or writes into it except
/// to zero-initialize it once on creation.
pub const HEADER_SIZE: u64 = 64;

/// The size gap between `size` and `committed_size` below which
/// [`crate::AsyncFile::allocate_space`] skips physical zero-fill.
pub const ALLOCATION_THRESHOLD: u64 = 1024 * 1024;

/// Size of the reusable zero buffer used to physically zero-fill newly
/// committed extents. Chosen well under `i32::MAX` (the largest single
/// positional write spec §4.5 allows per chunk) so the buffer is cheap to
/// allocate and reuse across an arbitrarily large commit.
pub const ZERO_CHUNK_SIZE: usize = 1024 * 1024;

/// Per-file override of the constants above.
///
/// Most callers should use [`AsyncFileConfig::default`], which matches the
/// documented `HEADER_SIZE`/`ALLOCATION_THRESHOLD` constants. A distinct
/// config is useful when embedding this primitive in a test harness that
/// wants a small header or a low allocation threshold to exercise the
/// physical-commit path without allocating megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncFileConfig {
    /// Size of the opaque header prefix, in bytes.
    pub header_size: u64,
    /// Gap between `size` and `committed_size` that triggers physical
    /// zero-fill on the next allocation past it.
    pub allocation_threshold: u64,
}

impl Default for AsyncFileConfig {
    fn default() -> Self {
        Self {
            header_size: HEADER_SIZE,
            allocation_threshold: ALLOCATION_THRESHOLD,
        }
    }
}
