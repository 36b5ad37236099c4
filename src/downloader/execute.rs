//! Single-task execution: request, status check, body copy, partial-file cleanup.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::task::TaskTracker;

use crate::error::DownloadError;

use super::registry::TaskRecord;
use super::worker::WorkerContext;

/// Execute one task under the per-task deadline and the run's abort token.
///
/// On timeout or abort the in-flight request is dropped and any partially
/// written destination file is removed. Other failures leave the file as is.
pub(crate) async fn execute_task(
    ctx: &WorkerContext,
    task: &TaskRecord,
) -> Result<u64, DownloadError> {
    let file_created = AtomicBool::new(false);
    let file_ops = TaskTracker::new();
    let task_timeout = ctx.task_timeout;

    let result = tokio::select! {
        biased;
        _ = ctx.abort.cancelled() => {
            Err(DownloadError::cancelled("run aborted while the request was in flight"))
        }
        fetched = tokio::time::timeout(task_timeout, fetch_to_file(ctx, task, &file_created, &file_ops)) => {
            fetched.unwrap_or_else(|_| Err(DownloadError::timeout(task_timeout)))
        }
    };

    let interrupted = matches!(&result, Err(e) if e.is_cancelled() || e.is_timeout());
    if interrupted && file_created.load(Ordering::Acquire) {
        // a create cut off by the deadline keeps running; remove the file only after it lands
        file_ops.close();
        file_ops.wait().await;
        remove_partial_file(task, &task.destination).await;
    }

    result
}

async fn fetch_to_file(
    ctx: &WorkerContext,
    task: &TaskRecord,
    file_created: &AtomicBool,
    file_ops: &TaskTracker,
) -> Result<u64, DownloadError> {
    let mut headers = (*ctx.default_headers).clone();
    for (name, value) in task.headers.iter() {
        headers.insert(name.clone(), value.clone());
    }

    let response = ctx.transport.get(&task.url, headers).await?;
    if !(200..=299).contains(&response.status) {
        return Err(DownloadError::HttpStatus {
            code: response.status,
        });
    }

    if ctx.create_parent_dirs {
        if let Some(parent) = task.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    file_created.store(true, Ordering::Release);
    let path = task.destination.clone();
    let mut file = file_ops
        .spawn(async move { tokio::fs::File::create(path).await })
        .await
        .map_err(|e| DownloadError::Io {
            message: format!("file creation task failed: {}", e),
        })??;

    let mut body = response.body;
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

async fn remove_partial_file(task: &TaskRecord, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(task_id = task.id.0, path = %path.display(), "Removed partial file");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                task_id = task.id.0,
                path = %path.display(),
                error = %e,
                "Failed to remove partial file"
            );
        }
    }
}
