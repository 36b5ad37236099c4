//! Batch execution: spawns the worker pool and freezes the run statistics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{Event, RunStatistics};

use super::registry::Batch;
use super::stats::RunCounters;
use super::worker::{WorkerContext, run_worker};
use super::{ActiveRun, BatchDownloader};

/// Keeps the engine busy for the lifetime of one run.
///
/// If the `run` future is dropped before its workers exited, the workers are
/// aborted (removing their partial files) and the engine stays busy until
/// they have all wound down.
struct RunGuard {
    running: Arc<AtomicBool>,
    active_slot: Arc<tokio::sync::Mutex<Option<ActiveRun>>>,
    active: ActiveRun,
    batch: Option<Arc<Batch>>,
    completed: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.completed {
            self.running.store(false, Ordering::Release);
            return;
        }

        tracing::warn!("Run dropped before completion, aborting its workers");
        self.active.dispatch.cancel();
        self.active.abort.cancel();

        let running = Arc::clone(&self.running);
        let active_slot = Arc::clone(&self.active_slot);
        let workers = self.active.workers.clone();
        let batch = self.batch.take();
        let cleanup = async move {
            workers.close();
            workers.wait().await;
            if let Some(batch) = batch {
                batch.abandon_unclaimed();
            }
            *active_slot.lock().await = None;
            running.store(false, Ordering::Release);
            tracing::debug!("Workers of the dropped run exited");
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(cleanup);
            }
            // no runtime left to drive the workers either
            Err(_) => self.running.store(false, Ordering::Release),
        }
    }
}

impl BatchDownloader {
    /// Execute every task added since the previous run and return the final statistics
    ///
    /// Spawns exactly `max_concurrency` workers. Each claims the next unclaimed
    /// task, executes it to completion, and repeats until the batch is exhausted
    /// or the run is stopped. Task failures are recorded on the task and counted;
    /// they never fail the run.
    ///
    /// When `handle_signals` is set, SIGINT/SIGTERM (Ctrl+C elsewhere) triggers
    /// [`stop`](Self::stop) for the duration of the run. The handlers stay
    /// registered with the process afterwards; see [`Config::handle_signals`](crate::Config::handle_signals).
    ///
    /// Dropping the returned future aborts the run's in-flight tasks; the
    /// engine reports [`Error::EngineBusy`] until those workers have exited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineBusy`] if a run is already in progress on this engine.
    pub async fn run(&self) -> Result<RunStatistics> {
        let active = ActiveRun::new();
        {
            // claimed and published under the slot lock: a stop() that sees the
            // engine running always finds this run's handles
            let mut slot = self.run_state.active.lock().await;
            if self
                .run_state
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(Error::EngineBusy);
            }
            *slot = Some(active.clone());
        }
        let mut guard = RunGuard {
            running: Arc::clone(&self.run_state.running),
            active_slot: Arc::clone(&self.run_state.active),
            active: active.clone(),
            batch: None,
            completed: false,
        };

        let batch = Arc::new(self.registry.take_batch().await);
        guard.batch = Some(Arc::clone(&batch));
        let total_tasks = batch.len();
        let workers = self.config.max_concurrency;

        let counters = Arc::new(RunCounters::default());
        let started_at = Utc::now();
        tracing::info!(total_tasks, workers, "Starting batch run");
        self.emit_event(Event::RunStarted {
            total_tasks,
            workers,
        });

        for worker_id in 0..workers {
            let ctx = WorkerContext {
                worker_id,
                batch: Arc::clone(&batch),
                transport: Arc::clone(&self.transport),
                default_headers: Arc::clone(&self.default_headers),
                task_timeout: self.config.task_timeout,
                create_parent_dirs: self.config.create_parent_dirs,
                dispatch: active.dispatch.clone(),
                abort: active.abort.clone(),
                counters: Arc::clone(&counters),
                event_tx: self.event_tx.clone(),
            };
            active.workers.spawn(run_worker(ctx));
        }
        active.workers.close();

        // the listener ends with this run, including when the run future is dropped
        let _signal_listener = self.config.handle_signals.then(|| {
            let run_done = CancellationToken::new();
            self.spawn_signal_listener(run_done.clone());
            run_done.drop_guard()
        });

        active.workers.wait().await;

        let abandoned = batch.abandon_unclaimed();
        if abandoned > 0 {
            counters.record_abandoned(abandoned);
            tracing::info!(abandoned, "Tasks left unclaimed after stop");
        }

        *self.run_state.active.lock().await = None;
        guard.completed = true;

        let stats = counters.freeze(total_tasks, abandoned, started_at, Utc::now());
        tracing::info!(
            total_tasks = stats.total_tasks,
            succeeded = stats.succeeded,
            failed = stats.failed,
            total_bytes = stats.total_bytes,
            elapsed = ?stats.elapsed(),
            "Batch run finished"
        );

        *self.run_state.last_stats.write().await = Some(stats.clone());
        self.emit_event(Event::RunFinished {
            stats: stats.clone(),
        });

        Ok(stats)
    }
}
