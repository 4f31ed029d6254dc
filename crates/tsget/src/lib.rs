//! # tsget-engine
//!
//! Downloads a segmented media stream described by an HLS manifest and
//! reassembles it into a single file.
//!
//! ## Features
//!
//! - Nested manifest resolution with depth and cycle guards
//! - Optional AES-128 key retrieval, with an explicit policy for failures
//! - Bounded concurrent segment downloads with per-segment retry
//! - In-place segment decryption on the blocking pool
//! - Deterministic, index-ordered merge
//!
//! ```no_run
//! use std::path::Path;
//! use tsget_engine::hls::{HlsConfigBuilder, HlsDownloader};
//!
//! # async fn run() -> Result<(), tsget_engine::DownloadError> {
//! let config = HlsConfigBuilder::new().download_concurrency(8).build();
//! let downloader = HlsDownloader::new(config)?;
//! let url = url::Url::parse("https://example.com/vod/index.m3u8").unwrap();
//! let report = downloader.download(&url, Path::new("."), "movie").await?;
//! println!("wrote {:?}", report.output);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::DownloaderConfigBuilder;
pub use config::{DownloaderConfig, HostMode};
pub use error::DownloadError;

// Re-export downloader utilities
pub use downloader::{ByteStream, HttpFetcher, ReqwestFetcher, create_client};
