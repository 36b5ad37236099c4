//! Common helpers for batch-dl integration tests

use std::time::Duration;

use batch_dl::{BatchDownloader, Config};
use tempfile::TempDir;

/// Config for tests: signal handling off, short timeouts
pub fn test_config(max_concurrency: usize) -> Config {
    Config {
        max_concurrency,
        task_timeout: Duration::from_secs(5),
        stop_timeout: Duration::from_millis(500),
        handle_signals: false,
        ..Default::default()
    }
}

/// Build a reqwest-backed downloader plus a scratch directory for destinations
pub fn create_downloader(config: Config) -> (BatchDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let downloader = BatchDownloader::new(config).expect("failed to build downloader");
    (downloader, temp_dir)
}

/// Deterministic payload of `len` bytes
#[allow(dead_code)]
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
