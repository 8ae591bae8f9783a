//! Log manager stub.

use std::sync::atomic::{AtomicU64, Ordering};

/// Reserved write-ahead-log collaborator.
///
/// Only the log sequence number counter exists today; record formats,
/// buffering and group commit belong to the recovery layer when it
/// lands.
#[derive(Debug, Default)]
pub struct LogManager {
    next_lsn: AtomicU64,
}

impl LogManager {
    /// Create a log manager starting at LSN 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next log sequence number.
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn.fetch_add(1, Ordering::Relaxed)
    }

    /// The next LSN that would be handed out.
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn.load(Ordering::Relaxed)
    }
}
