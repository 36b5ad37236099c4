//! Shared test helpers: an instrumented in-memory transport and engine builders.

use crate::config::Config;
use crate::downloader::BatchDownloader;
use crate::downloader::transport::{HttpTransport, TransportResponse};
use crate::error::DownloadError;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Canned response for one URL path
#[derive(Clone, Debug)]
pub(crate) struct MockRoute {
    pub(crate) status: u16,
    /// Body chunks, streamed in order
    pub(crate) chunks: Vec<Vec<u8>>,
    /// Delay before the response headers arrive
    pub(crate) delay: Duration,
    /// Delay between body chunks
    pub(crate) chunk_delay: Duration,
    /// Fail the body stream after the first chunk
    pub(crate) break_body: bool,
    /// Panic instead of responding
    pub(crate) panic: bool,
}

impl MockRoute {
    pub(crate) fn ok(body: &[u8]) -> Self {
        Self {
            status: 200,
            chunks: vec![body.to_vec()],
            delay: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            break_body: false,
            panic: false,
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(b"error page")
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Stream `first` immediately, then stall for `stall` before sending `rest`
    pub(crate) fn stalling(first: &[u8], stall: Duration, rest: &[u8]) -> Self {
        Self {
            chunks: vec![first.to_vec(), rest.to_vec()],
            chunk_delay: stall,
            ..Self::ok(b"")
        }
    }
}

#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

/// Decrements the in-flight count when the request (or its body stream) is dropped
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        let now = in_flight.current.fetch_add(1, Ordering::SeqCst) + 1;
        in_flight.max.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory transport that records request counts, headers and peak concurrency
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, MockRoute>>,
    calls: Mutex<HashMap<String, usize>>,
    headers: Mutex<HashMap<String, HeaderMap>>,
    in_flight: Arc<InFlight>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn route(&self, path: &str, route: MockRoute) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    /// Number of requests issued for `path`
    pub(crate) fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Headers of the last request for `path`
    pub(crate) fn headers(&self, path: &str) -> Option<HeaderMap> {
        self.headers.lock().unwrap().get(path).cloned()
    }

    /// Highest number of simultaneously open requests observed
    pub(crate) fn max_in_flight(&self) -> usize {
        self.in_flight.max.load(Ordering::SeqCst)
    }

    pub(crate) fn current_in_flight(&self) -> usize {
        self.in_flight.current.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn get(
        &self,
        url: &Url,
        headers: HeaderMap,
    ) -> Result<TransportResponse, DownloadError> {
        let guard = InFlightGuard::enter(&self.in_flight);
        let path = url.path().to_string();
        *self.calls.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
        self.headers.lock().unwrap().insert(path.clone(), headers);

        let route = self.routes.lock().unwrap().get(&path).cloned();
        let Some(route) = route else {
            return Ok(TransportResponse {
                status: 404,
                body: futures::stream::empty().boxed(),
            });
        };

        if route.panic {
            panic!("mock transport exploded on {}", path);
        }
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }

        let chunk_delay = route.chunk_delay;
        let break_body = route.break_body;
        let chunks = route.chunks.into_iter().enumerate();
        let body = futures::stream::unfold(
            (chunks, guard),
            move |(mut chunks, guard)| async move {
                let (index, chunk) = chunks.next()?;
                if index > 0 {
                    if break_body {
                        let err = DownloadError::Io {
                            message: "connection reset mid-body".to_string(),
                        };
                        return Some((Err(err), (chunks, guard)));
                    }
                    tokio::time::sleep(chunk_delay).await;
                }
                Some((Ok(Bytes::from(chunk)), (chunks, guard)))
            },
        )
        .boxed();

        Ok(TransportResponse {
            status: route.status,
            body,
        })
    }
}

/// Config for unit tests: no signal handler, short timeouts
pub(crate) fn test_config(max_concurrency: usize) -> Config {
    Config {
        max_concurrency,
        task_timeout: Duration::from_secs(2),
        stop_timeout: Duration::from_millis(300),
        handle_signals: false,
        ..Default::default()
    }
}

/// Build a downloader over a fresh mock transport
pub(crate) fn create_test_downloader(config: Config) -> (BatchDownloader, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let downloader = BatchDownloader::with_transport(
        config,
        Arc::clone(&transport) as Arc<dyn HttpTransport>,
    )
    .unwrap();
    (downloader, transport)
}
