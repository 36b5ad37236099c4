//! Basic batch example
//!
//! Demonstrates the core flow of batch-dl:
//! - Configuring concurrency, timeouts and default headers
//! - Queueing a batch of URL-to-file tasks
//! - Subscribing to events
//! - Running the batch (Ctrl+C stops it gracefully)
//! - Reporting failures and appending a statistics row
//!
//! Usage: `cargo run --example basic_batch -- <url>...`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use batch_dl::{BatchDownloader, Config, Event};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("usage: basic_batch <url>...");
        return Ok(());
    }

    let mut default_headers = HashMap::new();
    default_headers.insert("Referer".to_string(), "https://example.com/".to_string());

    let config = Config {
        max_concurrency: 4,
        task_timeout: Duration::from_secs(30),
        stop_timeout: Duration::from_secs(10),
        default_headers,
        ..Default::default()
    };
    let downloader = BatchDownloader::new(config)?;

    let output_dir = Path::new("downloads");
    for (index, url) in urls.iter().enumerate() {
        let destination = output_dir.join(file_name_for(url, index));
        let id = downloader.add_task(url, destination).await?;
        println!("Queued #{}: {}", id, url);
    }

    let mut events = downloader.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::RunStarted {
                    total_tasks,
                    workers,
                } => {
                    println!("Downloading {} files with {} workers", total_tasks, workers);
                }
                Event::TaskSucceeded { id, bytes } => {
                    println!("✓ #{} ({} bytes)", id, bytes);
                }
                Event::TaskFailed { id, error } => {
                    println!("✗ #{}: {}", id, error);
                }
                Event::Stopping => {
                    println!("Stopping, waiting for in-flight downloads...");
                }
                Event::RunFinished { .. } => break,
                _ => {}
            }
        }
    });

    let stats = downloader.run().await?;
    println!("{}", stats);

    batch_dl::report::log_failures(&downloader.tasks().await);
    batch_dl::report::append_statistics_row(Path::new("statistic.md"), &stats).await?;

    Ok(())
}

/// Last path segment of the URL, or a numbered fallback
fn file_name_for(url: &str, index: usize) -> PathBuf {
    url.rsplit('/')
        .next()
        .map(|name| name.split(['?', '#']).next().unwrap_or(name))
        .filter(|name| !name.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("{}.bin", index + 1)))
}
