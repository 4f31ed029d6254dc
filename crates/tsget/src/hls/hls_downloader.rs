use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::downloader::{HttpFetcher, ReqwestFetcher};
use crate::hls::config::{HlsConfig, KeyFailurePolicy};
use crate::hls::coordinator::{DownloadCoordinator, DownloadOutcome, RetryPolicy};
use crate::hls::events::DownloadEvent;
use crate::hls::key::{KeyFetcher, KeyOutcome};
use crate::hls::merger::{merge, unique_output_path};
use crate::hls::playlist::PlaylistResolver;
use crate::hls::segment::list_segments;
use crate::DownloadError;

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    /// Leaf manifest the segments were listed from.
    pub playlist_url: Url,
    /// Merged artifact; `None` when nothing was merged.
    pub output: Option<PathBuf>,
    pub segment_dir: PathBuf,
    /// One entry per segment, in index order.
    pub outcomes: Vec<DownloadOutcome>,
    pub encrypted: bool,
    pub merged_bytes: u64,
    pub elapsed: Duration,
}

impl DownloadReport {
    pub fn failed(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|o| o.success)
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}

pub struct HlsDownloader {
    fetcher: Arc<dyn HttpFetcher>,
    config: HlsConfig,
    cancel_token: CancellationToken,
    events: Option<UnboundedSender<DownloadEvent>>,
}

impl HlsDownloader {
    /// Create a downloader whose requests go through one shared reqwest client.
    pub fn new(config: HlsConfig) -> Result<Self, DownloadError> {
        let fetcher = ReqwestFetcher::from_config(&config.base)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: HlsConfig, fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self {
            fetcher,
            config,
            cancel_token: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<DownloadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &HlsConfig {
        &self.config
    }

    /// Download the stream behind `url` into `save_dir`.
    ///
    /// Segments land in `save_dir/<name>/`; the merged file is
    /// `save_dir/<name>.<ext>`, timestamp-suffixed if that name is taken.
    pub async fn download(
        &self,
        url: &Url,
        save_dir: &Path,
        name: &str,
    ) -> Result<DownloadReport, DownloadError> {
        let start_time = Instant::now();

        let resolver = PlaylistResolver::new(
            Arc::clone(&self.fetcher),
            self.config.playlist_config.max_playlist_depth,
        );
        let playlist = resolver.resolve(url).await?;

        let key = match KeyFetcher::new(Arc::clone(&self.fetcher))
            .fetch_key(&playlist.url, &playlist.body)
            .await
        {
            KeyOutcome::Found(key) => Some(Arc::new(key)),
            KeyOutcome::NotPresent => None,
            KeyOutcome::FetchFailed { url, reason } => {
                match self.config.decryption_config.key_failure_policy {
                    KeyFailurePolicy::Abort => {
                        return Err(DownloadError::KeyFetchFailed { url, reason });
                    }
                    KeyFailurePolicy::ProceedUnencrypted => {
                        warn!(
                            key_url = %url,
                            reason = %reason,
                            "Key unavailable, downloading segments without decryption"
                        );
                        None
                    }
                }
            }
        };
        let encrypted = key.is_some();

        let segments = list_segments(
            &playlist.url,
            &playlist.body,
            &self.config.playlist_config.segment_extensions,
        );
        if segments.is_empty() {
            return Err(DownloadError::SegmentListEmpty {
                url: playlist.url.to_string(),
            });
        }
        info!(
            playlist = %playlist.url,
            segments = segments.len(),
            encrypted,
            "Manifest resolved"
        );

        let segment_dir = save_dir.join(name);
        tokio::fs::create_dir_all(&segment_dir).await?;

        let fetcher_config = &self.config.fetcher_config;
        let mut coordinator = DownloadCoordinator::new(
            Arc::clone(&self.fetcher),
            &segment_dir,
            self.config.scheduler_config.download_concurrency,
        )
        .with_key(key)
        .with_retry_policy(RetryPolicy::new(
            fetcher_config.max_segment_retries,
            fetcher_config.segment_retry_delay,
        ))
        .with_cancellation_token(self.cancel_token.clone());
        if let Some(events) = &self.events {
            coordinator = coordinator.with_events(events.clone());
        }

        let outcomes = coordinator.run(segments).await;

        if self.cancel_token.is_cancelled() {
            warn!(dir = %segment_dir.display(), "Download cancelled, segments kept");
            return Err(DownloadError::Cancelled);
        }

        let failed: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| o.segment.name.clone())
            .collect();
        let output_config = &self.config.output_config;

        if !failed.is_empty() {
            if !output_config.allow_partial {
                warn!(
                    failed = failed.len(),
                    dir = %segment_dir.display(),
                    "Segments missing, skipping merge"
                );
                return Err(DownloadError::IncompleteDownload { failed });
            }
            warn!(
                failed = failed.len(),
                missing = %failed.join(", "),
                "Merging an incomplete download; the output has gaps"
            );
        }

        let names: Vec<String> = outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.segment.name.clone())
            .collect();

        let (output, merged_bytes) = if names.is_empty() {
            warn!("No segment downloaded, nothing to merge");
            (None, 0)
        } else {
            let output_path = unique_output_path(
                save_dir,
                name,
                &output_config.output_extension,
                Local::now(),
            );
            let bytes = merge(&segment_dir, &names, &output_path).await?;
            (Some(output_path), bytes)
        };

        if output_config.remove_segments && failed.is_empty() {
            match tokio::fs::remove_dir_all(&segment_dir).await {
                Ok(()) => debug!(dir = %segment_dir.display(), "Removed segment directory"),
                Err(e) => warn!(
                    dir = %segment_dir.display(),
                    error = %e,
                    "Could not remove segment directory"
                ),
            }
        }

        Ok(DownloadReport {
            playlist_url: playlist.url,
            output,
            segment_dir,
            outcomes,
            encrypted,
            merged_bytes,
            elapsed: start_time.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::config::HlsConfigBuilder;
    use crate::test_utils::{MockFetcher, encrypt_ecb};
    use reqwest::StatusCode;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn config() -> HlsConfigBuilder {
        HlsConfigBuilder::new().segment_retry_delay(Duration::ZERO)
    }

    fn manifest(encrypted: bool) -> String {
        let mut body = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:10\n");
        if encrypted {
            body.push_str("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n");
        }
        for i in 0..3 {
            body.push_str(&format!("#EXTINF:10,\nseg{i}.ts\n"));
        }
        body.push_str("#EXT-X-ENDLIST\n");
        body
    }

    fn plaintext(i: usize) -> Vec<u8> {
        vec![i as u8 + 1; 100 + i * 37]
    }

    fn encrypted_fetcher() -> MockFetcher {
        (0..3).fold(
            MockFetcher::new()
                .with_body("http://h/v/index.m3u8", manifest(true))
                .with_body("http://h/v/key.bin", KEY),
            |f, i| f.with_body(&format!("http://h/v/seg{i}.ts"), encrypt_ecb(&KEY, &plaintext(i))),
        )
    }

    #[tokio::test]
    async fn encrypted_stream_is_decrypted_and_merged_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let downloader =
            HlsDownloader::with_fetcher(config().build(), Arc::new(encrypted_fetcher()));

        let report = downloader
            .download(&url("http://h/v/index.m3u8"), dir.path(), "movie")
            .await
            .unwrap();

        let expected: Vec<u8> = (0..3).flat_map(plaintext).collect();
        let output = report.output.clone().unwrap();
        assert_eq!(output, dir.path().join("movie.mp4"));
        assert_eq!(std::fs::read(&output).unwrap(), expected);
        assert_eq!(report.merged_bytes, expected.len() as u64);
        assert!(report.encrypted);
        assert!(report.is_complete());
        assert!(!dir.path().join("movie").exists());
    }

    #[tokio::test]
    async fn key_failure_aborts_before_any_segment_download() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            encrypted_fetcher().with_status("http://h/v/key.bin", StatusCode::FORBIDDEN),
        );
        let downloader = HlsDownloader::with_fetcher(config().build(), fetcher.clone());

        let err = downloader
            .download(&url("http://h/v/index.m3u8"), dir.path(), "movie")
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::KeyFetchFailed { .. }));
        assert_eq!(fetcher.hits("http://h/v/seg0.ts"), 0);
        assert!(!dir.path().join("movie").exists());
    }

    #[tokio::test]
    async fn key_failure_can_proceed_without_decryption() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = (0..3).fold(
            MockFetcher::new().with_body("http://h/v/index.m3u8", manifest(true)),
            |f, i| f.with_body(&format!("http://h/v/seg{i}.ts"), plaintext(i)),
        );
        let config = config()
            .key_failure_policy(KeyFailurePolicy::ProceedUnencrypted)
            .build();
        let downloader = HlsDownloader::with_fetcher(config, Arc::new(fetcher));

        let report = downloader
            .download(&url("http://h/v/index.m3u8"), dir.path(), "movie")
            .await
            .unwrap();

        assert!(!report.encrypted);
        let expected: Vec<u8> = (0..3).flat_map(plaintext).collect();
        assert_eq!(std::fs::read(report.output.unwrap()).unwrap(), expected);
    }

    #[tokio::test]
    async fn manifest_without_segments_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new().with_body("http://h/index.m3u8", "#EXTM3U\n#EXT-X-ENDLIST\n");
        let downloader = HlsDownloader::with_fetcher(config().build(), Arc::new(fetcher));

        let err = downloader
            .download(&url("http://h/index.m3u8"), dir.path(), "movie")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::SegmentListEmpty { .. }));
    }

    fn fetcher_with_gap() -> MockFetcher {
        MockFetcher::new()
            .with_body("http://h/v/index.m3u8", manifest(false))
            .with_body("http://h/v/seg0.ts", "a")
            .with_status("http://h/v/seg1.ts", StatusCode::NOT_FOUND)
            .with_body("http://h/v/seg2.ts", "c")
    }

    #[tokio::test]
    async fn incomplete_download_is_not_merged_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = config().segment_retry_count(1).build();
        let downloader = HlsDownloader::with_fetcher(config, Arc::new(fetcher_with_gap()));

        let err = downloader
            .download(&url("http://h/v/index.m3u8"), dir.path(), "movie")
            .await
            .unwrap_err();

        match err {
            DownloadError::IncompleteDownload { failed } => assert_eq!(failed, ["00001.ts"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("movie.mp4").exists());
        assert!(dir.path().join("movie").join("00000.ts").exists());
    }

    #[tokio::test]
    async fn allow_partial_merges_what_succeeded() {
        let dir = tempfile::tempdir().unwrap();
        let config = config().segment_retry_count(0).allow_partial(true).build();
        let downloader = HlsDownloader::with_fetcher(config, Arc::new(fetcher_with_gap()));

        let report = downloader
            .download(&url("http://h/v/index.m3u8"), dir.path(), "movie")
            .await
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(
            report.failed().map(|o| o.segment.name.as_str()).collect::<Vec<_>>(),
            ["00001.ts"]
        );
        assert_eq!(report.succeeded().count(), 2);
        assert_eq!(std::fs::read(report.output.unwrap()).unwrap(), b"ac");
        // Kept so the gap can be inspected.
        assert!(dir.path().join("movie").exists());
    }

    #[tokio::test]
    async fn existing_output_gets_a_timestamped_sibling() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("movie.mp4"), b"old").unwrap();
        let config = config().remove_segments(false).build();
        let downloader = HlsDownloader::with_fetcher(config, Arc::new(encrypted_fetcher()));

        let report = downloader
            .download(&url("http://h/v/index.m3u8"), dir.path(), "movie")
            .await
            .unwrap();

        let output = report.output.unwrap();
        assert_ne!(output, dir.path().join("movie.mp4"));
        assert!(output.file_name().unwrap().to_str().unwrap().starts_with("movie_"));
        assert_eq!(std::fs::read(dir.path().join("movie.mp4")).unwrap(), b"old");
        assert!(dir.path().join("movie").join("00002.ts").exists());
    }

    #[tokio::test]
    async fn cancelled_run_reports_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let downloader =
            HlsDownloader::with_fetcher(config().build(), Arc::new(encrypted_fetcher()))
                .with_cancellation_token(token);

        let err = downloader
            .download(&url("http://h/v/index.m3u8"), dir.path(), "movie")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
    }
}
