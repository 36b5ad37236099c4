//! Worker loop: claims tasks from the batch and executes them one at a time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::error::DownloadError;
use crate::types::Event;

use super::execute::execute_task;
use super::registry::Batch;
use super::stats::RunCounters;
use super::transport::HttpTransport;

/// Everything a worker needs, cloned once per worker at run start.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) worker_id: usize,
    pub(crate) batch: Arc<Batch>,
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) default_headers: Arc<HeaderMap>,
    pub(crate) task_timeout: Duration,
    pub(crate) create_parent_dirs: bool,
    /// Cancelled when the run stops dispatching; idle workers exit
    pub(crate) dispatch: CancellationToken,
    /// Cancelled when in-flight requests must be aborted
    pub(crate) abort: CancellationToken,
    pub(crate) counters: Arc<RunCounters>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

/// Claim and execute tasks until the batch is exhausted or dispatch stops.
///
/// A task claimed after dispatch stopped is released unstarted and later
/// abandoned by the run.
///
/// A panic while executing a task is caught and recorded on that task; the
/// worker then moves on to the next one.
pub(crate) async fn run_worker(ctx: WorkerContext) {
    let total = ctx.batch.len();
    let mut executed = 0usize;

    loop {
        let Some(task) = ctx.batch.claim_next() else {
            break;
        };
        // checked after the claim so a stop landing in between cannot start one more task
        if ctx.dispatch.is_cancelled() {
            task.release();
            tracing::debug!(worker = ctx.worker_id, "Dispatch stopped, worker exiting");
            break;
        }
        task.mark_started();
        let id = task.id;
        tracing::debug!(worker = ctx.worker_id, task_id = id.0, url = %task.url, "Claimed task");
        ctx.event_tx.send(Event::TaskStarted { id }).ok();

        let result = AssertUnwindSafe(execute_task(&ctx, &task))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(task_id = id.0, panic = %message, "Task panicked");
                Err(DownloadError::Task { message })
            });

        task.finish(result.clone());
        let finished = ctx.counters.record(&result);
        executed += 1;

        match result {
            Ok(bytes) => {
                tracing::debug!(
                    task_id = id.0,
                    bytes,
                    progress = %format!("{}/{}", finished, total),
                    "Task succeeded"
                );
                ctx.event_tx.send(Event::TaskSucceeded { id, bytes }).ok();
            }
            Err(error) => {
                tracing::warn!(
                    task_id = id.0,
                    url = %task.url,
                    error = %error,
                    progress = %format!("{}/{}", finished, total),
                    "Task failed"
                );
                ctx.event_tx.send(Event::TaskFailed { id, error }).ok();
            }
        }
    }

    tracing::debug!(worker = ctx.worker_id, executed, "Worker finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
