use std::time::Duration;

/// Progress notifications emitted while segments download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Started {
        total: usize,
    },
    SegmentCompleted {
        name: String,
        bytes: u64,
        /// Segments completed so far, this one included.
        completed: usize,
        total: usize,
    },
    SegmentRetry {
        name: String,
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    SegmentFailed {
        name: String,
        attempts: u32,
        reason: String,
    },
    Finished {
        succeeded: usize,
        failed: usize,
    },
}
