//! Run summaries, failure listings and the append-only statistics table.
//!
//! Presentation helpers for callers; the engine itself never writes reports.

use std::fmt;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::types::{RunStatistics, TaskSnapshot, TaskStatus};

const STATISTICS_HEADER: &str = "| total | succeeded | failed | elapsed | tasks/s | MiB/s |\n\
| ------ | ------ | ------ | ------ | ------ | ------ |\n";

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total: {}, succeeded: {}, failed: {}, elapsed: {:.3}s, {:.2} tasks/s, {:.2} MiB/s",
            self.total_tasks,
            self.succeeded,
            self.failed,
            self.elapsed().as_secs_f64(),
            self.tasks_per_second(),
            self.throughput_mib_per_second(),
        )
    }
}

/// Log one warning per failed task, returning how many were logged
pub fn log_failures(tasks: &[TaskSnapshot]) -> usize {
    let mut logged = 0;
    for task in tasks.iter().filter(|t| t.status == TaskStatus::Failed) {
        let error = task
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        tracing::warn!(
            task_id = task.id.0,
            url = %task.url,
            destination = %task.destination.display(),
            error = %error,
            "Download failed"
        );
        logged += 1;
    }
    logged
}

/// Render one Markdown table row for `stats`
pub fn statistics_row(stats: &RunStatistics) -> String {
    format!(
        "| {} | {} | {} | {:.3}s | {:.2} | {:.2} |\n",
        stats.total_tasks,
        stats.succeeded,
        stats.failed,
        stats.elapsed().as_secs_f64(),
        stats.tasks_per_second(),
        stats.throughput_mib_per_second(),
    )
}

/// Append a row for `stats` to a Markdown statistics table
///
/// The table header is written first when the file does not exist yet.
pub async fn append_statistics_row(path: &Path, stats: &RunStatistics) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    if file.metadata().await?.len() == 0 {
        file.write_all(STATISTICS_HEADER.as_bytes()).await?;
    }
    file.write_all(statistics_row(stats).as_bytes()).await?;
    file.flush().await?;

    tracing::debug!(path = %path.display(), "Appended run statistics");
    Ok(())
}
