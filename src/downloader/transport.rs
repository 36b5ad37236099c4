//! HTTP transport seam between the engine and the HTTP client.

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::HeaderMap;
use url::Url;

use crate::config::Config;
use crate::error::{DownloadError, Result};

/// Response body as a stream of chunks
pub type BodyStream = BoxStream<'static, std::result::Result<Bytes, DownloadError>>;

/// Status and body of a GET response
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body; errors while streaming are reported as [`DownloadError::Io`]
    pub body: BodyStream,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Abstraction over issuing GET requests, shared by every worker.
///
/// Implementations must be safe for concurrent use. Deadlines and cancellation
/// are applied by the engine around the returned future and stream.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request with exactly the given headers
    async fn get(
        &self,
        url: &Url,
        headers: HeaderMap,
    ) -> std::result::Result<TransportResponse, DownloadError>;
}

/// Production [`HttpTransport`] backed by a pooled `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client from the engine configuration
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        let client = builder.build()?;
        tracing::debug!(
            connect_timeout = ?config.connect_timeout,
            "Built HTTP client"
        );
        Ok(Self { client })
    }

    /// Wrap an existing client (proxies, custom TLS, etc.)
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &Url,
        headers: HeaderMap,
    ) -> std::result::Result<TransportResponse, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .headers(headers)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| DownloadError::Io {
                    message: format!("response body interrupted: {}", e),
                })
            })
            .boxed();
        Ok(TransportResponse { status, body })
    }
}
