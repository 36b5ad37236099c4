//! Task registry: insertion-ordered task records and the exactly-once claim cursor.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::{DownloadError, Error, Result};
use crate::types::{TaskId, TaskSnapshot, TaskStatus};

/// Terminal result of a task, written once by the worker that executed it
#[derive(Debug)]
struct TaskOutcome {
    finished_at: DateTime<Utc>,
    result: std::result::Result<u64, DownloadError>,
}

/// One URL-to-file download unit.
///
/// Identity and request fields are immutable. Result fields are write-once
/// cells: a task is claimed by at most one worker, which is the only writer.
#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub(crate) id: TaskId,
    pub(crate) url: Url,
    pub(crate) destination: PathBuf,
    pub(crate) headers: HeaderMap,
    status: AtomicU8,
    started_at: OnceLock<DateTime<Utc>>,
    outcome: OnceLock<TaskOutcome>,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, url: Url, destination: PathBuf, headers: HeaderMap) -> Self {
        Self {
            id,
            url,
            destination,
            headers,
            status: AtomicU8::new(TaskStatus::Pending.to_u8()),
            started_at: OnceLock::new(),
            outcome: OnceLock::new(),
        }
    }

    pub(crate) fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Pending -> Running. Returns false if the task was already claimed.
    fn mark_running(&self) -> bool {
        self.status
            .compare_exchange(
                TaskStatus::Pending.to_u8(),
                TaskStatus::Running.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Stamp the start time once the claiming worker commits to executing the task
    pub(crate) fn mark_started(&self) {
        let _ = self.started_at.set(Utc::now());
    }

    /// Running -> Pending for a task that was claimed but never started.
    ///
    /// The claim cursor has already moved past it, so it stays unclaimed until
    /// the run abandons it.
    pub(crate) fn release(&self) {
        if self.started_at.get().is_none() {
            let _ = self.status.compare_exchange(
                TaskStatus::Running.to_u8(),
                TaskStatus::Pending.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Record the terminal state. Only the first call has any effect.
    pub(crate) fn finish(&self, result: std::result::Result<u64, DownloadError>) -> bool {
        let status = if result.is_ok() {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };
        let recorded = self
            .outcome
            .set(TaskOutcome {
                finished_at: Utc::now(),
                result,
            })
            .is_ok();
        if recorded {
            self.status.store(status.to_u8(), Ordering::Release);
        }
        recorded
    }

    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        let status = self.status();
        let outcome = self.outcome.get();
        let (bytes_transferred, error) = match outcome.map(|o| &o.result) {
            Some(Ok(bytes)) => (*bytes, None),
            Some(Err(e)) => (0, Some(e.clone())),
            None => (0, None),
        };
        TaskSnapshot {
            id: self.id,
            url: self.url.to_string(),
            destination: self.destination.clone(),
            status,
            bytes_transferred,
            error,
            started_at: self.started_at.get().copied(),
            finished_at: outcome.map(|o| o.finished_at),
        }
    }
}

/// The fixed task set of one run. Read-only apart from the claim cursor.
#[derive(Debug)]
pub(crate) struct Batch {
    tasks: Arc<[Arc<TaskRecord>]>,
    cursor: AtomicUsize,
}

impl Batch {
    pub(crate) fn new(tasks: Vec<Arc<TaskRecord>>) -> Self {
        Self {
            tasks: tasks.into(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Claim the next unclaimed task, or `None` once the batch is exhausted.
    ///
    /// The cursor is advanced atomically, so every index is handed out once.
    pub(crate) fn claim_next(&self) -> Option<Arc<TaskRecord>> {
        loop {
            let index = self.cursor.fetch_add(1, Ordering::AcqRel);
            let task = self.tasks.get(index)?;
            if task.mark_running() {
                return Some(Arc::clone(task));
            }
        }
    }

    /// Fail every task that no worker claimed. Returns how many were abandoned.
    pub(crate) fn abandon_unclaimed(&self) -> usize {
        let mut abandoned = 0;
        for task in self.tasks.iter() {
            if task.status() == TaskStatus::Pending
                && task.finish(Err(DownloadError::cancelled(
                    "run stopped before the task was claimed",
                )))
            {
                abandoned += 1;
            }
        }
        abandoned
    }
}

#[derive(Debug, Default)]
pub(crate) struct RegistryInner {
    tasks: Vec<Arc<TaskRecord>>,
    /// Index of the first task not yet handed to a run
    batch_start: usize,
}

/// Holds every task added to an engine, in insertion order
#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
    inner: tokio::sync::RwLock<RegistryInner>,
}

impl TaskRegistry {
    pub(crate) async fn add(
        &self,
        url: &str,
        destination: PathBuf,
        headers: &HashMap<String, String>,
    ) -> Result<TaskId> {
        let url = parse_url(url)?;
        if destination.as_os_str().is_empty() {
            return Err(Error::InvalidInput(format!(
                "destination path for {} is empty",
                url
            )));
        }
        let headers = parse_headers(headers)?;

        let mut inner = self.inner.write().await;
        let id = TaskId(inner.tasks.len() as u64 + 1);
        inner
            .tasks
            .push(Arc::new(TaskRecord::new(id, url, destination, headers)));
        Ok(id)
    }

    /// Hand every task added since the previous run to a new batch
    pub(crate) async fn take_batch(&self) -> Batch {
        let mut inner = self.inner.write().await;
        let start = inner.batch_start;
        inner.batch_start = inner.tasks.len();
        Batch::new(inner.tasks[start..].to_vec())
    }

    pub(crate) async fn pending_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.tasks.len() - inner.batch_start
    }

    pub(crate) async fn snapshot(&self) -> Vec<TaskSnapshot> {
        let inner = self.inner.read().await;
        inner.tasks.iter().map(|t| t.snapshot()).collect()
    }

    /// Hold the registry exclusively, stalling `take_batch` until the guard drops
    #[cfg(test)]
    pub(crate) async fn lock_exclusive(&self) -> tokio::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().await
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidInput("url is empty".to_string()));
    }
    let url = Url::parse(raw)
        .map_err(|e| Error::InvalidInput(format!("malformed url '{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!(
            "unsupported scheme '{}' in url '{}'",
            url.scheme(),
            raw
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidInput(format!("url '{}' has no host", raw)));
    }
    Ok(url)
}

fn parse_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid header name '{}': {}", name, e)))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            Error::InvalidInput(format!("invalid value for header '{}': {}", name, e))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
