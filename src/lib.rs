//! # batch-dl
//!
//! Bounded-concurrency batch HTTP downloader.
//!
//! Feed it a flat list of (URL, destination) tasks, run it, and read back
//! per-task outcomes and aggregate statistics.
//!
//! ## Design
//!
//! - **Bounded** - a fixed pool of `max_concurrency` workers pulls tasks; never one task per request
//! - **Contained failures** - a failing or panicking task is recorded on that task and the run continues
//! - **Clean cancellation** - per-task timeouts, plus a graceful stop (signal or caller) that aborts
//!   stragglers after `stop_timeout` and removes their partial files
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use batch_dl::{BatchDownloader, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = BatchDownloader::new(Config {
//!         max_concurrency: 4,
//!         ..Default::default()
//!     })?;
//!
//!     for i in 1..=10 {
//!         downloader
//!             .add_task(&format!("https://example.com/img/{i}.jpg"), format!("images/{i}.jpg"))
//!             .await?;
//!     }
//!
//!     let stats = downloader.run().await?;
//!     println!("{stats}");
//!
//!     batch_dl::report::log_failures(&downloader.tasks().await);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Run summaries and statistics files
pub mod report;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use downloader::BatchDownloader;
pub use downloader::transport::{BodyStream, HttpTransport, ReqwestTransport, TransportResponse};
pub use error::{DownloadError, Error, NetworkErrorKind, Result};
pub use types::{Event, RunStatistics, TaskId, TaskSnapshot, TaskStatus};

/// Wait for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub(crate) async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
