use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::{DownloadError, DownloaderConfig};

/// Chunked response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// The HTTP capability the engine depends on: a GET issued with the run's
/// request profile, returning either the full body or a chunk stream.
///
/// Non-success statuses are reported as [`DownloadError::HttpStatus`].
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &Url, operation: &'static str)
    -> Result<Bytes, DownloadError>;

    async fn fetch_stream(
        &self,
        url: &Url,
        operation: &'static str,
    ) -> Result<ByteStream, DownloadError>;

    /// Fetch a textual resource. Invalid UTF-8 is replaced rather than rejected.
    async fn fetch_text(&self, url: &Url, operation: &'static str) -> Result<String, DownloadError> {
        let bytes = self.fetch_bytes(url, operation).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, DownloadError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5) // Allow multiple connections to same host
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    if config.danger_accept_invalid_certs {
        info!("TLS certificate verification disabled");
    }

    client_builder.build().map_err(DownloadError::from)
}

/// [`HttpFetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        Ok(Self::new(create_client(config)?))
    }

    async fn send(
        &self,
        url: &Url,
        operation: &'static str,
    ) -> Result<reqwest::Response, DownloadError> {
        debug!(url = %url, operation, "GET");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(status, url.as_str(), operation));
        }
        Ok(response)
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch_bytes(
        &self,
        url: &Url,
        operation: &'static str,
    ) -> Result<Bytes, DownloadError> {
        let response = self.send(url, operation).await?;
        response.bytes().await.map_err(DownloadError::from)
    }

    async fn fetch_stream(
        &self,
        url: &Url,
        operation: &'static str,
    ) -> Result<ByteStream, DownloadError> {
        let response = self.send(url, operation).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DownloadError::from))
            .boxed())
    }
}
