//! Core types for batch-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::DownloadError;

/// Unique identifier for a task, assigned in insertion order starting at 1
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl PartialEq<u64> for TaskId {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Added, not yet claimed by a worker
    Pending,
    /// Claimed and executing
    Running,
    /// Finished, file written
    Succeeded,
    /// Finished with an error
    Failed,
}

impl TaskStatus {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskStatus::Pending,
            1 => TaskStatus::Running,
            2 => TaskStatus::Succeeded,
            _ => TaskStatus::Failed,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Succeeded => 2,
            TaskStatus::Failed => 3,
        }
    }

    /// Succeeded or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// Read-only view of one task, as seen by the caller after (or before) a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task ID
    pub id: TaskId,
    /// Source URL
    pub url: String,
    /// Destination file path
    pub destination: PathBuf,
    /// Current state
    pub status: TaskStatus,
    /// Bytes written to the destination (0 unless the task succeeded)
    pub bytes_transferred: u64,
    /// Terminal error, if the task failed
    pub error: Option<DownloadError>,
    /// When a worker claimed the task
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    /// Time spent executing, if the task was claimed and has finished
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}

/// Aggregate statistics for one run, frozen when the run completes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Number of tasks in the batch
    pub total_tasks: usize,
    /// Tasks that ended in `Succeeded`
    pub succeeded: usize,
    /// Tasks that ended in `Failed` (includes `abandoned`)
    pub failed: usize,
    /// Tasks never claimed because the run was stopped
    pub abandoned: usize,
    /// Bytes written across all successful tasks
    pub total_bytes: u64,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the last worker exited
    pub finished_at: DateTime<Utc>,
}

impl RunStatistics {
    /// Wall-clock duration of the run
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Successful tasks per second (0.0 for an instantaneous run)
    pub fn tasks_per_second(&self) -> f64 {
        per_second(self.succeeded as f64, self.elapsed())
    }

    /// Download throughput in MiB per second (0.0 for an instantaneous run)
    pub fn throughput_mib_per_second(&self) -> f64 {
        per_second(self.total_bytes as f64 / (1u64 << 20) as f64, self.elapsed())
    }
}

fn per_second(amount: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { amount / secs } else { 0.0 }
}

/// Events emitted by the downloader
///
/// Consumers subscribe via [`BatchDownloader::subscribe`](crate::BatchDownloader::subscribe).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run started
    RunStarted {
        /// Tasks in the batch
        total_tasks: usize,
        /// Worker count
        workers: usize,
    },

    /// A worker claimed a task
    TaskStarted {
        /// Task ID
        id: TaskId,
    },

    /// A task finished successfully
    TaskSucceeded {
        /// Task ID
        id: TaskId,
        /// Bytes written
        bytes: u64,
    },

    /// A task failed
    TaskFailed {
        /// Task ID
        id: TaskId,
        /// Why it failed
        error: DownloadError,
    },

    /// Stop requested: no further tasks will be claimed
    Stopping,

    /// The run completed (normally or after a stop)
    RunFinished {
        /// Final statistics
        stats: RunStatistics,
    },
}
