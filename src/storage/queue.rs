use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use super::types::DatabaseError;

/// Single-slot FIFO queue for write transactions.
///
/// At most one submitted operation runs at a time, in submission order
/// (tokio's `Mutex` hands the lock out first-come first-served). A failed
/// or cancelled operation releases the slot like a successful one, so it
/// only fails its own caller. Reads do not go through the queue.
#[derive(Debug, Default)]
pub(crate) struct WriteQueue {
    slot: Mutex<()>,
    submitted: AtomicU64,
}

impl WriteQueue {
    /// Runs `op` once every earlier submission has finished.
    ///
    /// `op` is not polled before the slot is acquired, so nothing it does
    /// can interleave with another queued write.
    pub(crate) async fn run<T, F>(&self, label: &'static str, op: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        let seq = self.submitted.fetch_add(1, Ordering::Relaxed);
        let _slot = self.slot.lock().await;
        tracing::trace!(op = label, seq, "Write started");

        let result = op.await;
        if let Err(e) = &result {
            tracing::warn!(op = label, seq, error = %e, "Write failed, rolled back");
        }
        result
    }
}
