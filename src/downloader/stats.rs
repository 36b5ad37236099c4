//! Aggregate counters for a run, updated once per task completion.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use crate::error::DownloadError;
use crate::types::RunStatistics;

/// Shared counters for the run in progress.
///
/// Each task is recorded exactly once by the worker that finished it; the
/// values are only frozen into [`RunStatistics`] after every worker exited.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    total_bytes: AtomicU64,
}

impl RunCounters {
    /// Record one terminal task result, returning the number of tasks finished so far
    pub(crate) fn record(&self, result: &std::result::Result<u64, DownloadError>) -> usize {
        match result {
            Ok(bytes) => {
                self.total_bytes.fetch_add(*bytes, Ordering::Relaxed);
                let succeeded = self.succeeded.fetch_add(1, Ordering::AcqRel) + 1;
                succeeded + self.failed.load(Ordering::Acquire)
            }
            Err(_) => {
                let failed = self.failed.fetch_add(1, Ordering::AcqRel) + 1;
                failed + self.succeeded.load(Ordering::Acquire)
            }
        }
    }

    /// Account for tasks failed without being claimed
    pub(crate) fn record_abandoned(&self, count: usize) {
        self.failed.fetch_add(count, Ordering::AcqRel);
    }

    pub(crate) fn freeze(
        &self,
        total_tasks: usize,
        abandoned: usize,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> RunStatistics {
        RunStatistics {
            total_tasks,
            succeeded: self.succeeded.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            abandoned,
            total_bytes: self.total_bytes.load(Ordering::Acquire),
            started_at,
            finished_at,
        }
    }
}
