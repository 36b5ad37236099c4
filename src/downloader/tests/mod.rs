use super::*;
use crate::downloader::registry::{Batch, TaskRecord};
use crate::downloader::test_helpers::{MockRoute, create_test_downloader, test_config};
use crate::error::{DownloadError, Error};
use crate::types::{Event, TaskStatus};
use std::time::{Duration, Instant};


/// Wait until `count` TaskStarted events have been received
async fn wait_for_started(events: &mut tokio::sync::broadcast::Receiver<Event>, count: usize) {
    let mut started = 0;
    tokio::time::timeout(Duration::from_secs(5), async {
        while started < count {
            if let Ok(Event::TaskStarted { .. }) = events.recv().await {
                started += 1;
            }
        }
    })
    .await
    .expect("timed out waiting for tasks to start");
}
