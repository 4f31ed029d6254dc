use indicatif::ProgressStyle;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{Span, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tsget_engine::hls::DownloadEvent;

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{span_child_prefix}{spinner:.green} [{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

/// Tally of the events seen by the renderer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    pub completed: usize,
    pub failed: usize,
    pub retries: usize,
}

/// Renders download events as a single progress bar.
pub struct ProgressManager {
    span: Span,
    summary: ProgressSummary,
}

impl ProgressManager {
    pub fn new() -> Self {
        let span = info_span!("segments");
        span.pb_set_style(&download_style());
        Self {
            span,
            summary: ProgressSummary::default(),
        }
    }

    pub fn handle_event(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Started { total } => {
                self.span.pb_set_length(total as u64);
                self.span.pb_start();
            }
            DownloadEvent::SegmentCompleted { name, .. } => {
                self.summary.completed += 1;
                self.span.pb_inc(1);
                self.span.pb_set_message(&name);
            }
            DownloadEvent::SegmentRetry { name, attempt, .. } => {
                self.summary.retries += 1;
                self.span
                    .pb_set_message(&format!("retrying {name} (attempt {attempt} failed)"));
            }
            DownloadEvent::SegmentFailed { name, .. } => {
                self.summary.failed += 1;
                self.span.pb_inc(1);
                self.span.pb_set_message(&format!("{name} failed"));
            }
            DownloadEvent::Finished { .. } => {
                self.span.pb_set_message("done");
            }
        }
    }

    /// Consume events until every sender is dropped.
    pub async fn run(mut self, mut events: UnboundedReceiver<DownloadEvent>) -> ProgressSummary {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        self.summary
    }
}
