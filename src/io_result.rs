//! The joinable handle returned by [`crate::AsyncFile::write_batch`].
//!
//! Spec §4.4 describes a latch-counted callback protocol: each pair
//! dispatches a completion handler that redispatches on partial writes,
//! decrements a shared latch on completion (success or failure), and
//! `await()` blocks until the latch reaches zero before re-raising the
//! first captured failure.
//!
//! Expressed with `async`/`await` instead of manual callbacks, the
//! "completion handler that redispatches on partial completion" is just the
//! retry loop inside each pair's own task (see
//! `AsyncFile::write_one_pair` in `async_file.rs`); the "latch" is the set
//! of per-pair `tokio_uring` task handles, and "await() blocks until the
//! latch reaches zero" is waiting out every handle before looking at the
//! results. The first error in pair order is surfaced, matching spec's "the
//! first failure cause" (this crate submits pairs in order, so "first" is
//! unambiguous even though completion order across pairs is not
//! guaranteed).

use crate::error::AsyncFileError;

/// A joinable handle over a batch of positional writes submitted by
/// [`crate::AsyncFile::write_batch`].
///
/// No ordering is guaranteed between the writes for different pairs; only
/// the writes belonging to one pair are sequential with each other. Callers
/// must not submit overlapping offset ranges within a single batch.
#[must_use = "a write_batch submission is not awaited until `wait` is called"]
pub struct IoResult {
    pub(crate) handles: Vec<tokio_uring::task::JoinHandle<Result<(), AsyncFileError>>>,
}

impl IoResult {
    /// Blocks until every pair in the batch has completed, then re-raises
    /// the first failure observed, if any.
    ///
    /// All pairs are always waited out, even if an earlier one failed —
    /// mirroring spec §4.4's latch, which only reaches zero once every pair
    /// has reported in.
    pub async fn wait(self) -> Result<(), AsyncFileError> {
        let mut first_err = None;
        for handle in self.handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "write_batch pair task panicked");
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
