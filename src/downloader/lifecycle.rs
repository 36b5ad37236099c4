//! Stop coordination and signal handling.

use tokio_util::sync::CancellationToken;

use crate::types::Event;

use super::BatchDownloader;

impl BatchDownloader {
    /// Stop the run in progress
    ///
    /// This method performs a graceful stop sequence:
    /// 1. Stops dispatch: idle workers exit without claiming further tasks
    /// 2. Waits up to `stop_timeout` for in-flight tasks to finish
    /// 3. Aborts requests still running after that; their partial files are removed
    ///
    /// Returns once the in-flight tasks finished or the timeout elapsed, whichever
    /// comes first. Aborted tasks may still be cleaning up when this returns;
    /// [`run`](Self::run) returns only after every worker exited.
    ///
    /// Does nothing if no run is in progress.
    pub async fn stop(&self) {
        let active = {
            let guard = self.run_state.active.lock().await;
            let Some(active) = guard.clone() else {
                tracing::debug!("Stop requested with no active run");
                return;
            };
            // checked under the lock so concurrent callers emit Stopping once
            if !active.dispatch.is_cancelled() {
                tracing::info!("Stopping run: no further tasks will be claimed");
                active.dispatch.cancel();
                self.emit_event(Event::Stopping);
            }
            active
        };

        let stop_timeout = self.config.stop_timeout;
        match tokio::time::timeout(stop_timeout, active.workers.wait()).await {
            Ok(()) => {
                tracing::info!("All in-flight tasks finished before the stop timeout");
            }
            Err(_) => {
                tracing::warn!(
                    ?stop_timeout,
                    "Stop timeout elapsed, aborting in-flight requests"
                );
                active.abort.cancel();
            }
        }
    }

    /// Listen for termination signals until `run_done` is cancelled
    pub(crate) fn spawn_signal_listener(&self, run_done: CancellationToken) {
        let downloader = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = run_done.cancelled() => {}
                _ = crate::wait_for_signal() => {
                    downloader.stop().await;
                }
            }
        });
    }
}
