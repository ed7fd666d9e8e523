//! A durable, header-offset async file primitive built on `tokio-uring`.
//!
//! [`AsyncFile`] gives callers random-access reads and writes at logical
//! offsets, transparently reserving a fixed-size header at the start of the
//! backing file; atomic space preallocation that coalesces physical
//! zero-fill work behind a threshold; a dirty-counter-coalesced `synch`
//! barrier; and shared/exclusive lock discipline so structural operations
//! (open, close, rename, shrink, ...) never race the data plane.
//!
//! This crate does not define a record layout, serialization, recovery
//! protocol, or page cache — it is a single-file storage primitive meant to
//! sit underneath one.

mod async_file;
mod config;
mod error;
mod io_result;

pub use async_file::AsyncFile;
pub use config::{AsyncFileConfig, ALLOCATION_THRESHOLD, HEADER_SIZE, ZERO_CHUNK_SIZE};
pub use error::{AsyncFileError, Result};
pub use io_result::IoResult;
