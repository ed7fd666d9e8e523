//! The core of this crate: a durable, header-offset async file.
//!
//! Grounded on the teacher's `CoreStorage`/`UringStorage` (`storage/src/core_storage.rs`,
//! `src/storage.rs` in the repository this crate started from): both wrap
//! `tokio_uring::fs::File`, open with a `std::fs::File` first to capture a
//! raw fd before handing it to `File::from_std`, and round-trip owned
//! buffers through `read_at`/`write_at` rather than borrowing slices — the
//! same pattern `PageStore::read_page`/`write_page` used. This module
//! generalizes that page-store-specific plumbing into the header-offset,
//! allocate/zero-fill/synch primitive spec'd for reuse by any caller, not
//! just a fixed 8KB page store.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_uring::buf::BoundedBuf;
use tokio_uring::fs::{File, OpenOptions};

use crate::config::AsyncFileConfig;
use crate::error::{AsyncFileError, Result};
use crate::io_result::IoResult;

/// Structural state guarded by `AsyncFile::state`: the path and, if open,
/// the channel. The channel's presence is the "open" predicate (spec §3).
#[derive(Debug)]
struct FileState {
    path: PathBuf,
    channel: Option<File>,
    raw_fd: Option<RawFd>,
}

/// A durable, header-offset async file.
///
/// Callers address bytes in a logical space starting at 0; this type adds
/// `HEADER_SIZE` before every access to the underlying channel, reserving a
/// fixed opaque prefix for whatever sits above it (page cache, WAL). See
/// the crate-level docs for the full contract.
///
/// Reads, writes, allocation, and `synch` all take the shared half of an
/// internal reader-writer lock so they never serialize against each other;
/// lifecycle operations (`create`, `open`, `close`, `delete`, `rename_to`,
/// `replace_content_with`, `shrink`) take the exclusive half so they fully
/// drain outstanding data-plane work first. [`write_batch`](Self::write_batch)
/// needs `Arc<AsyncFile>` because its per-pair tasks outlive the call that
/// submits them — see that method's docs for why, and for the documented
/// resolution of the close-vs-in-flight-batch race spec design notes call
/// out as an open question.
#[derive(Debug)]
pub struct AsyncFile {
    state: RwLock<FileState>,
    size: AtomicU64,
    committed_size: AtomicU64,
    dirty_counter: AtomicU64,
    flush_mutex: Mutex<()>,
    config: AsyncFileConfig,
}

impl AsyncFile {
    /// Creates a new, unopened handle bound to `path`, using the default
    /// [`AsyncFileConfig`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, AsyncFileConfig::default())
    }

    /// Like [`new`](Self::new), with an explicit [`AsyncFileConfig`].
    pub fn with_config(path: impl Into<PathBuf>, config: AsyncFileConfig) -> Self {
        Self {
            state: RwLock::new(FileState {
                path: path.into(),
                channel: None,
                raw_fd: None,
            }),
            size: AtomicU64::new(0),
            committed_size: AtomicU64::new(0),
            dirty_counter: AtomicU64::new(0),
            flush_mutex: Mutex::new(()),
            config,
        }
    }

    // ---- lifecycle ----------------------------------------------------

    /// Creates the backing file, truncating it if it already exists, and
    /// initializes the header.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::State`] if this handle is already open, or
    /// [`AsyncFileError::Io`] if the underlying filesystem call fails.
    pub async fn create(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.channel.is_some() {
            return Err(AsyncFileError::state(&state.path, "create called on an already-open file"));
        }
        tracing::debug!(path = %state.path.display(), "creating file");
        let std_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&state.path)
            .map_err(|e| AsyncFileError::io(&state.path, e))?;
        let raw_fd = std_file.as_raw_fd();
        state.channel = Some(File::from_std(std_file));
        state.raw_fd = Some(raw_fd);
        self.init_size(&state).await?;
        Ok(())
    }

    /// Opens the existing backing file and re-derives `size`/`committed_size`
    /// from its current physical length.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::State`] if this handle is already open, or
    /// [`AsyncFileError::Io`] if the underlying filesystem call fails.
    pub async fn open(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.channel.is_some() {
            return Err(AsyncFileError::state(&state.path, "open called on an already-open file"));
        }
        tracing::debug!(path = %state.path.display(), "opening file");
        let std_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&state.path)
            .map_err(|e| AsyncFileError::io(&state.path, e))?;
        let raw_fd = std_file.as_raw_fd();
        state.channel = Some(File::from_std(std_file));
        state.raw_fd = Some(raw_fd);
        self.init_size(&state).await?;
        Ok(())
    }

    /// Closes the channel. The path remains remembered for a later `open`.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::Io`] if the channel fails to close cleanly.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.assert_open(&state)?;
        tracing::debug!(path = %state.path.display(), "closing file");
        if let Some(file) = state.channel.take() {
            file.close().await.map_err(|e| AsyncFileError::io(&state.path, e))?;
        }
        state.raw_fd = None;
        Ok(())
    }

    /// Closes the channel (if open) and removes the backing file.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::Io`] if the close or removal fails.
    pub async fn delete(&self) -> Result<()> {
        let mut state = self.state.write().await;
        tracing::debug!(path = %state.path.display(), "deleting file");
        if let Some(file) = state.channel.take() {
            file.close().await.map_err(|e| AsyncFileError::io(&state.path, e))?;
        }
        state.raw_fd = None;
        std::fs::remove_file(&state.path).map_err(|e| AsyncFileError::io(&state.path, e))?;
        self.size.store(0, Ordering::Release);
        self.committed_size.store(0, Ordering::Release);
        Ok(())
    }

    /// Closes, moves the backing file to `new_path` on disk, updates the
    /// remembered path, and reopens it.
    ///
    /// Contents and logical size are preserved byte-for-byte; only the path
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::State`] if the handle is not open, or
    /// [`AsyncFileError::Io`] on any underlying filesystem failure.
    pub async fn rename_to(&self, new_path: impl Into<PathBuf>) -> Result<()> {
        let new_path = new_path.into();
        let mut state = self.state.write().await;
        self.assert_open(&state)?;
        tracing::debug!(from = %state.path.display(), to = %new_path.display(), "renaming file");
        if let Some(file) = state.channel.take() {
            file.close().await.map_err(|e| AsyncFileError::io(&state.path, e))?;
        }
        state.raw_fd = None;
        std::fs::rename(&state.path, &new_path).map_err(|e| AsyncFileError::io(&state.path, e))?;
        state.path = new_path;
        self.reopen(&mut state).await?;
        Ok(())
    }

    /// Closes, overwrites this file's content with a copy of `src`, and
    /// reopens it at the same path.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::State`] if the handle is not open, or
    /// [`AsyncFileError::Io`] on any underlying filesystem failure.
    pub async fn replace_content_with(&self, src: impl AsRef<Path>) -> Result<()> {
        let mut state = self.state.write().await;
        self.assert_open(&state)?;
        tracing::debug!(path = %state.path.display(), source = %src.as_ref().display(), "replacing file content");
        if let Some(file) = state.channel.take() {
            file.close().await.map_err(|e| AsyncFileError::io(&state.path, e))?;
        }
        state.raw_fd = None;
        std::fs::copy(src.as_ref(), &state.path).map_err(|e| AsyncFileError::io(&state.path, e))?;
        self.reopen(&mut state).await?;
        Ok(())
    }

    /// Whether the backing path currently exists on disk.
    pub async fn exists(&self) -> bool {
        let state = self.state.read().await;
        state.path.exists()
    }

    /// Whether this handle currently has an open channel.
    pub async fn is_open(&self) -> bool {
        let state = self.state.read().await;
        state.channel.is_some()
    }

    /// The current logical size (excluding the header), per spec §3's
    /// `size` counter. Lock-free: `size` is an atomic and this is the only
    /// externally-observable reading of it.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// The file name component of the current path.
    pub async fn name(&self) -> Option<String> {
        let state = self.state.read().await;
        state.path.file_name().map(|n| n.to_string_lossy().into_owned())
    }

    /// Increments the dirty counter without performing a write.
    ///
    /// Exposed for callers that batch their own writes outside this type
    /// (e.g. through a page cache) and want `synch` to flush on their
    /// behalf — see spec §9's discussion of dirty-counter semantics.
    pub fn mark_dirty(&self) {
        self.dirty_counter.fetch_add(1, Ordering::AcqRel);
    }

    // ---- read/write path ------------------------------------------------

    /// Reads into `buf` starting at logical `offset`, returning the buffer
    /// back alongside the number of bytes actually filled.
    ///
    /// Performs as many positional reads as necessary to fill `buf`. If
    /// end-of-file is reached first: returns an [`AsyncFileError::Eof`] when
    /// `throw_on_eof` is `true`, otherwise returns successfully with fewer
    /// bytes filled than `buf.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::Range`] if `offset >= file_size()`,
    /// [`AsyncFileError::State`] if the file is not open, or
    /// [`AsyncFileError::Io`]/[`AsyncFileError::Eof`] per the above.
    pub async fn read_at(&self, offset: u64, buf: Vec<u8>, throw_on_eof: bool) -> (Vec<u8>, Result<usize>) {
        let state = self.state.read().await;
        if let Err(e) = self.assert_open(&state) {
            return (buf, Err(e));
        }
        let size = self.size.load(Ordering::Acquire);
        if offset >= size {
            return (buf, Err(AsyncFileError::range(&state.path, offset, size)));
        }
        let file = state.channel.as_ref().expect("checked open above");
        let header_size = self.config.header_size;
        let total = buf.len();
        let mut filled = 0usize;
        let mut buf = buf;
        while filled < total {
            let slice = buf.slice(filled..total);
            let (res, slice) = file.read_at(slice, offset + header_size + filled as u64).await;
            buf = slice.into_inner();
            match res {
                Ok(0) => {
                    if throw_on_eof {
                        return (buf, Err(AsyncFileError::eof(&state.path)));
                    }
                    return (buf, Ok(filled));
                }
                Ok(n) => filled += n,
                Err(e) => return (buf, Err(AsyncFileError::io(&state.path, e))),
            }
        }
        (buf, Ok(filled))
    }

    /// Writes the entirety of `buf` at logical `offset`, returning the
    /// buffer back once fully drained (or on the first I/O error).
    ///
    /// Performs as many positional writes as necessary; a short write from
    /// the channel simply advances the offset and retries with the
    /// remainder, per spec §4.3.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::Range`] if `offset >= file_size()`,
    /// [`AsyncFileError::State`] if the file is not open, or
    /// [`AsyncFileError::Io`] on an underlying I/O failure.
    pub async fn write_at(&self, offset: u64, buf: Vec<u8>) -> (Vec<u8>, Result<()>) {
        let state = self.state.read().await;
        if let Err(e) = self.assert_open(&state) {
            return (buf, Err(e));
        }
        let size = self.size.load(Ordering::Acquire);
        if offset >= size {
            return (buf, Err(AsyncFileError::range(&state.path, offset, size)));
        }
        let file = state.channel.as_ref().expect("checked open above");
        let header_size = self.config.header_size;
        let (buf, result) = write_all_at(file, &state.path, buf, offset + header_size).await;
        if result.is_ok() {
            self.dirty_counter.fetch_add(1, Ordering::AcqRel);
        }
        (buf, result)
    }

    // ---- batched write path --------------------------------------------

    /// Submits a batch of independent `(offset, buffer)` writes and returns
    /// a joinable [`IoResult`].
    ///
    /// Offsets are validated synchronously, under this file's shared lock,
    /// before any write is dispatched — a bad offset or a closed file fails
    /// the whole submission immediately rather than surfacing only when
    /// `wait()` is called. Each pair is then handed to its own task that
    /// performs its writes sequentially (no ordering is promised *between*
    /// pairs); `IoResult::wait` joins every task and re-raises the first
    /// failure observed, in pair order.
    ///
    /// Takes `Arc<Self>` rather than `&self` because the per-pair tasks
    /// outlive this call — they keep the file alive and keep re-validating
    /// it's open independently of whatever happens to this call's stack
    /// frame. Callers must not submit overlapping offset ranges within one
    /// batch.
    ///
    /// A close() that lands after submission but before a given pair's task
    /// has run its own lock acquisition will make that pair observe the
    /// file as closed and fail with [`AsyncFileError::State`], rather than
    /// blocking close until every submitted-but-not-yet-started pair
    /// finishes. This is the documented resolution to the completion-handler
    /// re-entry hazard spec's design notes call out: a fair async
    /// `RwLock` means no deadlock is possible, at the cost of this one
    /// narrow race being a failure rather than a wait. A stricter drain
    /// would need a dedicated in-flight refcount that `close` waits on;
    /// this crate does not add one (see DESIGN.md).
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::Range`] or [`AsyncFileError::State`]
    /// synchronously if any pair's offset is out of range or the file is
    /// closed at submission time.
    pub async fn write_batch(self: Arc<Self>, pairs: Vec<(u64, Vec<u8>)>) -> Result<IoResult> {
        {
            let state = self.state.read().await;
            self.assert_open(&state)?;
            let size = self.size.load(Ordering::Acquire);
            for (offset, _) in &pairs {
                if *offset >= size {
                    return Err(AsyncFileError::range(&state.path, *offset, size));
                }
            }
        }

        let mut handles = Vec::with_capacity(pairs.len());
        for (offset, buf) in pairs {
            let this = Arc::clone(&self);
            let handle = tokio_uring::spawn(async move {
                let state = this.state.read().await;
                this.assert_open(&state)?;
                let file = state.channel.as_ref().expect("checked open above");
                let header_size = this.config.header_size;
                let (_, result) = write_all_at(file, &state.path, buf, offset + header_size).await;
                if result.is_ok() {
                    this.dirty_counter.fetch_add(1, Ordering::AcqRel);
                }
                result
            });
            handles.push(handle);
        }
        Ok(IoResult { handles })
    }

    // ---- allocation & zero-fill -----------------------------------------

    /// Atomically grows the logical size by `n` bytes and returns the start
    /// of the newly reserved range.
    ///
    /// The fast path (the gap between the new size and the last physically
    /// committed offset stays within the allocation threshold) is a single
    /// atomic add. When the gap crosses the threshold, exactly one
    /// concurrent caller wins a compare-and-swap on `committed_size` and
    /// pays the cost of physically zero-filling the newly committed extent;
    /// everyone else continues to take the fast path. See spec §4.5.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::State`] if the file is not open, or
    /// [`AsyncFileError::Io`] if the physical zero-fill write fails.
    pub async fn allocate_space(&self, n: u64) -> Result<u64> {
        let state = self.state.read().await;
        self.assert_open(&state)?;

        let new_size = self.size.fetch_add(n, Ordering::AcqRel) + n;
        let start = new_size - n;

        loop {
            let committed = self.committed_size.load(Ordering::Acquire);
            if new_size.saturating_sub(committed) <= self.config.allocation_threshold {
                return Ok(start);
            }
            match self
                .committed_size
                .compare_exchange(committed, new_size, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let file = state.channel.as_ref().expect("checked open above");
                    zero_fill(file, &state.path, self.config.header_size, committed, new_size).await?;
                    return Ok(start);
                }
                Err(_) => continue,
            }
        }
    }

    // ---- shrink -----------------------------------------------------------

    /// Truncates the physical file to `new_size + HEADER_SIZE` and resets
    /// both `size` and `committed_size` to 0.
    ///
    /// This is the literal behavior spec'd in §4.6 and exercised by the
    /// end-to-end scenario in spec §8 (#6): after `shrink`, logical offset 0
    /// is out of range until the next `allocate_space`. See DESIGN.md for
    /// why this crate keeps that behavior rather than the §9 "reset to
    /// `new_size`" alternative.
    ///
    /// # Errors
    ///
    /// Returns [`AsyncFileError::State`] if the file is not open, or
    /// [`AsyncFileError::Io`] if the truncation fails.
    pub async fn shrink(&self, new_size: u64) -> Result<()> {
        let state = self.state.write().await;
        self.assert_open(&state)?;
        let raw_fd = state.raw_fd.expect("checked open above");
        let physical_len = new_size + self.config.header_size;
        // SAFETY: `raw_fd` is owned by the open channel held by `state`,
        // valid for the duration of this call since we hold the exclusive
        // lock.
        let ret = unsafe { libc::ftruncate(raw_fd, physical_len as libc::off_t) };
        if ret != 0 {
            return Err(AsyncFileError::io(&state.path, io::Error::last_os_error()));
        }
        self.size.store(0, Ordering::Release);
        self.committed_size.store(0, Ordering::Release);
        Ok(())
    }

    // ---- durability ---------------------------------------------------

    /// Coalesces outstanding writes into a single fsync.
    ///
    /// Never raises: if the durability barrier fails, this logs a warning
    /// and leaves `dirty_counter` unchanged so the next `synch` retries
    /// (spec §4.7, §7). A no-op if `dirty_counter == 0` at entry.
    pub async fn synch(&self) {
        let state = self.state.read().await;
        let _flush_guard = self.flush_mutex.lock().await;

        let dirty = self.dirty_counter.load(Ordering::Acquire);
        if dirty == 0 {
            return;
        }
        let Some(file) = state.channel.as_ref() else {
            return;
        };
        match file.sync_all().await {
            Ok(()) => {
                self.dirty_counter.fetch_sub(dirty, Ordering::AcqRel);
            }
            Err(error) => {
                tracing::warn!(
                    path = %state.path.display(),
                    dirty,
                    %error,
                    "synch: fsync failed, dirty counter preserved for retry"
                );
            }
        }
    }

    // ---- internals ------------------------------------------------------

    fn assert_open(&self, state: &FileState) -> Result<()> {
        if state.channel.is_none() {
            return Err(AsyncFileError::state(&state.path, "operation requires an open file"));
        }
        Ok(())
    }

    /// Writes `HEADER_SIZE` zero bytes at offset 0 if the physical file is
    /// shorter than that, then re-derives `size`/`committed_size` from the
    /// (pre-write) physical length. Spec §4.1.
    async fn init_size(&self, state: &FileState) -> Result<()> {
        let file = state.channel.as_ref().expect("channel present during init_size");
        let physical_size = std::fs::metadata(&state.path)
            .map_err(|e| AsyncFileError::io(&state.path, e))?
            .len();

        let header_size = self.config.header_size;
        if physical_size < header_size {
            let zero = vec![0u8; header_size as usize];
            let (_, result) = write_all_at(file, &state.path, zero, 0).await;
            result?;
            self.dirty_counter.fetch_add(1, Ordering::AcqRel);
        }

        let logical_size = physical_size.saturating_sub(header_size);
        self.size.store(logical_size, Ordering::Release);
        self.committed_size.store(logical_size, Ordering::Release);
        Ok(())
    }

    async fn reopen(&self, state: &mut FileState) -> Result<()> {
        let std_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&state.path)
            .map_err(|e| AsyncFileError::io(&state.path, e))?;
        let raw_fd = std_file.as_raw_fd();
        state.channel = Some(File::from_std(std_file));
        state.raw_fd = Some(raw_fd);
        self.init_size(state).await
    }
}

/// Writes all of `buf` at `offset`, retrying on short writes until drained.
///
/// Always hands the buffer back, success or failure, since `tokio_uring`
/// transfers ownership of buffers across the suspension point and the
/// caller needs them back either way (to reuse, in the allocation zero-fill
/// loop, or simply to free on its own terms).
async fn write_all_at(file: &File, path: &Path, buf: Vec<u8>, offset: u64) -> (Vec<u8>, Result<()>) {
    let total = buf.len();
    let mut written = 0usize;
    let mut buf = buf;
    while written < total {
        let slice = buf.slice(written..total);
        let (res, slice) = file.write_at(slice, offset + written as u64).await;
        buf = slice.into_inner();
        match res {
            Ok(0) => {
                return (
                    buf,
                    Err(AsyncFileError::io(path, io::Error::new(io::ErrorKind::WriteZero, "write returned zero bytes"))),
                );
            }
            Ok(n) => written += n,
            Err(e) => return (buf, Err(AsyncFileError::io(path, e))),
        }
    }
    (buf, Ok(()))
}

/// Physically zero-fills logical bytes `[start, end)`, partitioned into
/// chunks bounded by `crate::config::ZERO_CHUNK_SIZE` (well under the
/// `i32::MAX`-per-chunk ceiling spec §4.5 allows), reusing one zero buffer
/// across every chunk of this call.
async fn zero_fill(file: &File, path: &Path, header_size: u64, start: u64, end: u64) -> Result<()> {
    let mut remaining = end.saturating_sub(start);
    let mut pos = start;
    let mut buf = vec![0u8; crate::config::ZERO_CHUNK_SIZE];
    while remaining > 0 {
        let chunk_len = remaining.min(crate::config::ZERO_CHUNK_SIZE as u64) as usize;
        if buf.len() != chunk_len {
            buf.truncate(chunk_len);
        }
        let (returned, result) = write_all_at(file, path, buf, pos + header_size).await;
        result?;
        buf = returned;
        pos += chunk_len as u64;
        remaining -= chunk_len as u64;
    }
    Ok(())
}
