// HLS download pipeline: manifest resolution, key retrieval, segment listing,
// bounded concurrent download, in-place decryption and merge.

pub mod config;
pub mod coordinator;
pub mod decryption;
pub mod events;
pub mod hls_downloader;
pub mod key;
pub mod merger;
pub mod playlist;
pub mod segment;

// Re-exports for easier access
pub use config::{HlsConfig, HlsConfigBuilder, KeyFailurePolicy};
pub use coordinator::{DownloadCoordinator, DownloadOutcome, RetryPolicy};
pub use events::DownloadEvent;
pub use hls_downloader::{DownloadReport, HlsDownloader};
pub use key::{DecryptionKey, KeyFetcher, KeyOutcome};
pub use playlist::{PlaylistResolver, ResolvedPlaylist};
pub use segment::{SegmentRef, list_segments};
