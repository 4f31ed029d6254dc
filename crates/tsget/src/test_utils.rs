//! In-memory HTTP fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aes::Aes128;
use aes::cipher::{BlockEncryptMut, KeyInit, block_padding::Pkcs7};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::StatusCode;
use url::Url;

use crate::DownloadError;
use crate::downloader::{ByteStream, HttpFetcher};

/// Macro to initialize tracing for tests
///
/// Usage:
/// - `init_test_tracing!()` - uses DEBUG level (default)
/// - `init_test_tracing!(INFO)` - uses specified level
macro_rules! init_test_tracing {
    () => {
        init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}

pub(crate) use init_test_tracing;

const CHUNK_SIZE: usize = 7;

#[derive(Debug, Clone)]
enum Route {
    Body(Bytes),
    Status(StatusCode),
    /// Answer 503 `remaining` more times, then serve the body.
    Flaky { remaining: u32, body: Bytes },
    /// Yield the first chunk of the body, then a stream error.
    Broken(Bytes),
}

/// [`HttpFetcher`] over a fixed route table. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    hits: Mutex<HashMap<String, u32>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(self, url: &str, route: Route) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), route);
        self
    }

    pub fn with_body(self, url: &str, body: impl AsRef<[u8]>) -> Self {
        let body = Bytes::copy_from_slice(body.as_ref());
        self.route(url, Route::Body(body))
    }

    pub fn with_status(self, url: &str, status: StatusCode) -> Self {
        self.route(url, Route::Status(status))
    }

    pub fn with_flaky_body(self, url: &str, failures: u32, body: impl AsRef<[u8]>) -> Self {
        let body = Bytes::copy_from_slice(body.as_ref());
        self.route(
            url,
            Route::Flaky {
                remaining: failures,
                body,
            },
        )
    }

    pub fn with_broken_stream(self, url: &str, body: impl AsRef<[u8]>) -> Self {
        let body = Bytes::copy_from_slice(body.as_ref());
        self.route(url, Route::Broken(body))
    }

    /// Delay every request by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of requests issued for `url`.
    pub fn hits(&self, url: &str) -> u32 {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Highest number of requests that were pending at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn answer(&self, url: &Url, operation: &'static str) -> Result<Route, DownloadError> {
        *self
            .hits
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url.as_str()) {
            None => Err(DownloadError::http_status(
                StatusCode::NOT_FOUND,
                url.as_str(),
                operation,
            )),
            Some(Route::Status(status)) => {
                Err(DownloadError::http_status(*status, url.as_str(), operation))
            }
            Some(Route::Flaky { remaining, body }) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    Err(DownloadError::http_status(
                        StatusCode::SERVICE_UNAVAILABLE,
                        url.as_str(),
                        operation,
                    ))
                } else {
                    Ok(Route::Body(body.clone()))
                }
            }
            Some(route) => Ok(route.clone()),
        }
    }
}

#[async_trait]
impl HttpFetcher for MockFetcher {
    async fn fetch_bytes(
        &self,
        url: &Url,
        operation: &'static str,
    ) -> Result<Bytes, DownloadError> {
        match self.answer(url, operation).await? {
            Route::Body(body) => Ok(body),
            _ => Err(DownloadError::Io {
                source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "body truncated"),
            }),
        }
    }

    async fn fetch_stream(
        &self,
        url: &Url,
        operation: &'static str,
    ) -> Result<ByteStream, DownloadError> {
        match self.answer(url, operation).await? {
            Route::Body(body) => {
                let chunks: Vec<Result<Bytes, DownloadError>> = body
                    .chunks(CHUNK_SIZE)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Ok(futures::stream::iter(chunks).boxed())
            }
            Route::Broken(body) => {
                let first = body.slice(..body.len().min(CHUNK_SIZE));
                let items: Vec<Result<Bytes, DownloadError>> = vec![
                    Ok(first),
                    Err(DownloadError::Io {
                        source: std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            "connection reset",
                        ),
                    }),
                ];
                Ok(futures::stream::iter(items).boxed())
            }
            _ => unreachable!("answer only yields bodies"),
        }
    }
}

/// AES-128-ECB encrypt with PKCS#7 padding.
pub fn encrypt_ecb(key: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    type Aes128EcbEnc = ecb::Encryptor<Aes128>;
    let mut buf = vec![0u8; plaintext.len() + 16];
    buf[..plaintext.len()].copy_from_slice(plaintext);
    let len = Aes128EcbEnc::new(key.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .unwrap()
        .len();
    buf.truncate(len);
    buf
}
