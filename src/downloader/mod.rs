//! Core downloader implementation split into focused submodules.
//!
//! The `BatchDownloader` struct and its methods are organized by concern:
//! - [`registry`] - Task records, batches and the exactly-once claim cursor
//! - [`run`] - Batch execution with a fixed worker pool
//! - [`lifecycle`] - Stop coordination and signal handling
//! - [`worker`] - Worker loop and panic containment
//! - [`execute`] - Single-task request and file writing
//! - [`stats`] - Aggregate counters
//! - [`transport`] - HTTP transport abstraction

mod execute;
mod lifecycle;
pub(crate) mod registry;
mod run;
mod stats;
pub(crate) mod transport;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::error::Result;
use crate::types::{Event, RunStatistics, TaskId, TaskSnapshot};

use registry::TaskRegistry;
use transport::{HttpTransport, ReqwestTransport};

/// Cancellation handles of the run in progress
#[derive(Clone)]
pub(crate) struct ActiveRun {
    /// Stops workers from claiming further tasks
    pub(crate) dispatch: CancellationToken,
    /// Aborts requests still in flight
    pub(crate) abort: CancellationToken,
    /// Tracks the worker tasks of this run
    pub(crate) workers: TaskTracker,
}

impl ActiveRun {
    fn new() -> Self {
        Self {
            dispatch: CancellationToken::new(),
            abort: CancellationToken::new(),
            workers: TaskTracker::new(),
        }
    }
}

/// Run bookkeeping shared by all clones of the downloader
#[derive(Clone, Default)]
pub(crate) struct RunState {
    /// Set while a run is in progress (one run per engine at a time)
    pub(crate) running: Arc<AtomicBool>,
    /// Cancellation handles of the current run, if any
    pub(crate) active: Arc<tokio::sync::Mutex<Option<ActiveRun>>>,
    /// Statistics of the most recent completed run
    pub(crate) last_stats: Arc<tokio::sync::RwLock<Option<RunStatistics>>>,
}

/// Batch downloader engine (cloneable - all fields are Arc-wrapped)
///
/// Clones share the registry, the transport and the run state, so one clone
/// can call [`stop`](Self::stop) while another is blocked in [`run`](Self::run).
#[derive(Clone)]
pub struct BatchDownloader {
    /// Configuration (wrapped in Arc for sharing across workers)
    pub(crate) config: Arc<Config>,
    /// HTTP transport shared by every worker
    pub(crate) transport: Arc<dyn HttpTransport>,
    /// Accept, User-Agent and configured extra headers
    pub(crate) default_headers: Arc<HeaderMap>,
    /// Every task added to this engine
    pub(crate) registry: Arc<TaskRegistry>,
    /// Run bookkeeping
    pub(crate) run_state: RunState,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl BatchDownloader {
    /// Create a downloader backed by a `reqwest` client built from `config`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for invalid settings and
    /// [`Error::Http`](crate::Error::Http) if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a downloader that issues requests through a custom transport
    pub fn with_transport(config: Config, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        config.validate()?;
        let default_headers = config.request_headers()?;
        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.event_capacity);

        tracing::debug!(
            max_concurrency = config.max_concurrency,
            task_timeout = ?config.task_timeout,
            stop_timeout = ?config.stop_timeout,
            "Batch downloader initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            transport,
            default_headers: Arc::new(default_headers),
            registry: Arc::new(TaskRegistry::default()),
            run_state: RunState::default(),
            event_tx,
        })
    }

    /// Add a download task for the next run
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`](crate::Error::InvalidInput) if the URL is
    /// empty, malformed, not http/https or has no host, or if the destination is empty.
    pub async fn add_task(&self, url: &str, destination: impl Into<PathBuf>) -> Result<TaskId> {
        self.add_task_with_headers(url, destination, &HashMap::new())
            .await
    }

    /// Add a download task carrying extra request headers
    ///
    /// Task headers override the engine's default headers of the same name.
    pub async fn add_task_with_headers(
        &self,
        url: &str,
        destination: impl Into<PathBuf>,
        headers: &HashMap<String, String>,
    ) -> Result<TaskId> {
        let id = self
            .registry
            .add(url, destination.into(), headers)
            .await?;
        tracing::debug!(task_id = id.0, url, "Task added");
        Ok(id)
    }

    /// Insertion-ordered snapshot of every task known to this engine
    pub async fn tasks(&self) -> Vec<TaskSnapshot> {
        self.registry.snapshot().await
    }

    /// Number of tasks added since the last run started
    pub async fn pending_count(&self) -> usize {
        self.registry.pending_count().await
    }

    /// Statistics of the most recent completed run
    ///
    /// Returns the same value on every call until the next run completes.
    pub async fn result(&self) -> Option<RunStatistics> {
        self.run_state.last_stats.read().await.clone()
    }

    /// Whether a run is currently in progress
    pub fn is_running(&self) -> bool {
        self.run_state
            .running
            .load(std::sync::atomic::Ordering::Acquire)
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Subscribers that fall behind by more than `event_capacity` events receive
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the configuration this engine was built with
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers (dropped if nobody is listening)
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
