// HLS Download Coordinator: downloads every listed segment with bounded
// parallelism, per-segment retry and cooperative cancellation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::DownloadError;
use crate::downloader::HttpFetcher;
use crate::hls::decryption::decrypt_in_place;
use crate::hls::events::DownloadEvent;
use crate::hls::key::DecryptionKey;
use crate::hls::segment::SegmentRef;

/// How often a failing segment is tried again, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total attempts a permanently failing segment receives.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Final state of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub segment: SegmentRef,
    pub success: bool,
    pub attempts: u32,
    /// Bytes written to disk by the successful attempt.
    pub bytes: u64,
    pub error: Option<String>,
}

impl DownloadOutcome {
    fn succeeded(segment: SegmentRef, attempts: u32, bytes: u64) -> Self {
        Self {
            segment,
            success: true,
            attempts,
            bytes,
            error: None,
        }
    }

    fn failed(segment: SegmentRef, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            segment,
            success: false,
            attempts,
            bytes: 0,
            error: Some(error.into()),
        }
    }
}

/// State shared by every spawned download of one run.
struct SegmentWorker {
    fetcher: Arc<dyn HttpFetcher>,
    segment_dir: PathBuf,
    key: Option<Arc<DecryptionKey>>,
    retry_policy: RetryPolicy,
    cancel_token: CancellationToken,
    events: Option<UnboundedSender<DownloadEvent>>,
}

impl SegmentWorker {
    fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.events {
            // A closed channel only means nobody renders progress.
            let _ = tx.send(event);
        }
    }

    async fn download(&self, segment: SegmentRef) -> DownloadOutcome {
        let path = self.segment_dir.join(&segment.name);
        let mut attempts = 0u32;

        loop {
            if self.cancel_token.is_cancelled() {
                return DownloadOutcome::failed(
                    segment,
                    attempts,
                    DownloadError::Cancelled.to_string(),
                );
            }

            // Cancellation is only observed between attempts; an attempt in
            // progress runs to completion or to its read timeout.
            attempts += 1;
            let err = match self.attempt(&segment, &path).await {
                Ok(bytes) => {
                    debug!(segment = %segment.name, attempts, bytes, "Segment downloaded");
                    return DownloadOutcome::succeeded(segment, attempts, bytes);
                }
                Err(err) => err,
            };

            discard_partial(&path).await;

            if !err.is_retryable() || attempts > self.retry_policy.max_retries {
                error!(
                    segment = %segment.name,
                    url = %segment.source_url,
                    attempts,
                    error = %err,
                    "Segment failed permanently"
                );
                return DownloadOutcome::failed(segment, attempts, err.to_string());
            }

            warn!(
                segment = %segment.name,
                attempt = attempts,
                max_attempts = self.retry_policy.max_attempts(),
                error = %err,
                "Segment attempt failed, retrying"
            );
            self.emit(DownloadEvent::SegmentRetry {
                name: segment.name.clone(),
                attempt: attempts,
                delay: self.retry_policy.delay,
                reason: err.to_string(),
            });

            tokio::select! {
                _ = self.cancel_token.cancelled() => {}
                _ = tokio::time::sleep(self.retry_policy.delay) => {}
            }
        }
    }

    /// Stream the segment to disk, then decrypt it when a key is present.
    async fn attempt(&self, segment: &SegmentRef, path: &Path) -> Result<u64, DownloadError> {
        let mut stream = self
            .fetcher
            .fetch_stream(&segment.source_url, "segment")
            .await?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if let Some(key) = &self.key {
            decrypt_in_place(path, key).await?;
        }
        Ok(written)
    }
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial segment file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove partial segment file"),
    }
}

/// Downloads a batch of segments into one directory.
///
/// At most `concurrency` downloads run at once. A failing segment never stops
/// the others; every segment yields exactly one [`DownloadOutcome`].
pub struct DownloadCoordinator {
    fetcher: Arc<dyn HttpFetcher>,
    segment_dir: PathBuf,
    concurrency: usize,
    key: Option<Arc<DecryptionKey>>,
    retry_policy: RetryPolicy,
    cancel_token: CancellationToken,
    events: Option<UnboundedSender<DownloadEvent>>,
    completed: Arc<AtomicUsize>,
}

impl DownloadCoordinator {
    pub fn new(
        fetcher: Arc<dyn HttpFetcher>,
        segment_dir: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            segment_dir: segment_dir.into(),
            concurrency: concurrency.max(1),
            key: None,
            retry_policy: RetryPolicy::default(),
            cancel_token: CancellationToken::new(),
            events: None,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_key(mut self, key: Option<Arc<DecryptionKey>>) -> Self {
        self.key = key;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<DownloadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Shared count of segments completed by the current run.
    ///
    /// Reset to zero whenever [`run`](Self::run) starts.
    pub fn progress(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.completed)
    }

    pub async fn run(&self, segments: Vec<SegmentRef>) -> Vec<DownloadOutcome> {
        let total = segments.len();
        self.completed.store(0, Ordering::SeqCst);
        info!(
            total,
            concurrency = self.concurrency,
            encrypted = self.key.is_some(),
            dir = %self.segment_dir.display(),
            "Starting segment downloads"
        );
        let worker = Arc::new(SegmentWorker {
            fetcher: Arc::clone(&self.fetcher),
            segment_dir: self.segment_dir.clone(),
            key: self.key.clone(),
            retry_policy: self.retry_policy,
            cancel_token: self.cancel_token.clone(),
            events: self.events.clone(),
        });
        worker.emit(DownloadEvent::Started { total });

        let mut pending = segments.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut outcomes = Vec::with_capacity(total);

        loop {
            while in_flight.len() < self.concurrency {
                let Some(segment) = pending.next() else { break };
                let worker = Arc::clone(&worker);
                let task_segment = segment.clone();
                let handle = tokio::spawn(async move { worker.download(task_segment).await });
                in_flight.push(async move { (segment, handle.await) });
            }

            let Some((segment, joined)) = in_flight.next().await else {
                break;
            };

            let outcome = joined.unwrap_or_else(|e| {
                error!(segment = %segment.name, error = %e, "Segment task aborted");
                DownloadOutcome::failed(segment, 0, format!("task aborted: {e}"))
            });
            self.record(&worker, &outcome, total);
            outcomes.push(outcome);
        }

        outcomes.sort_by_key(|o| o.segment.index);

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;
        info!(succeeded, failed, total, "Segment downloads finished");
        worker.emit(DownloadEvent::Finished { succeeded, failed });
        outcomes
    }

    fn record(&self, worker: &SegmentWorker, outcome: &DownloadOutcome, total: usize) {
        if outcome.success {
            let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
            worker.emit(DownloadEvent::SegmentCompleted {
                name: outcome.segment.name.clone(),
                bytes: outcome.bytes,
                completed,
                total,
            });
        } else {
            worker.emit(DownloadEvent::SegmentFailed {
                name: outcome.segment.name.clone(),
                attempts: outcome.attempts,
                reason: outcome.error.clone().unwrap_or_default(),
            });
        }
    }
}
