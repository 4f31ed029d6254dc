use std::time::Duration;

use crate::DownloaderConfig;

/// What to do when the manifest names a key that cannot be retrieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum KeyFailurePolicy {
    /// Fail the run before any segment is downloaded.
    #[default]
    Abort,
    /// Download the segments as-is, without decryption.
    #[cfg_attr(feature = "clap", value(name = "proceed"))]
    ProceedUnencrypted,
}

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    pub playlist_config: HlsPlaylistConfig,
    pub scheduler_config: HlsSchedulerConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub decryption_config: HlsDecryptionConfig,
    pub output_config: HlsOutputConfig,
}

// --- Playlist Configuration ---
#[derive(Debug, Clone)]
pub struct HlsPlaylistConfig {
    /// Nested manifests deeper than this abort the run
    pub max_playlist_depth: usize,
    /// Recognised segment file extensions, without the dot
    pub segment_extensions: Vec<String>,
}

impl Default for HlsPlaylistConfig {
    fn default() -> Self {
        Self {
            max_playlist_depth: 10,
            segment_extensions: vec!["ts".to_string()],
        }
    }
}

// --- Scheduler Configuration ---
#[derive(Debug, Clone)]
pub struct HlsSchedulerConfig {
    pub download_concurrency: usize, // Max concurrent segment downloads
}

impl Default for HlsSchedulerConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 24,
        }
    }
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    pub max_segment_retries: u32,
    pub segment_retry_delay: Duration,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            max_segment_retries: 3,
            segment_retry_delay: Duration::from_secs(2),
        }
    }
}

// --- Decryption Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsDecryptionConfig {
    pub key_failure_policy: KeyFailurePolicy,
}

#[derive(Debug, Clone)]
pub struct HlsOutputConfig {
    /// Merge the successful segments even when some failed permanently.
    pub allow_partial: bool,
    /// Remove the segment directory after a complete, successful merge.
    pub remove_segments: bool,
    /// Extension of the merged artifact, without the dot.
    pub output_extension: String,
}

impl Default for HlsOutputConfig {
    fn default() -> Self {
        Self {
            allow_partial: false,
            remove_segments: true,
            output_extension: "mp4".to_string(),
        }
    }
}

/// Fluent builder over [`HlsConfig`].
#[derive(Debug, Clone, Default)]
pub struct HlsConfigBuilder {
    config: HlsConfig,
}

impl HlsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_config(mut self, base: DownloaderConfig) -> Self {
        self.config.base = base;
        self
    }

    pub fn download_concurrency(mut self, concurrency: usize) -> Self {
        self.config.scheduler_config.download_concurrency = concurrency;
        self
    }

    pub fn segment_retry_count(mut self, retries: u32) -> Self {
        self.config.fetcher_config.max_segment_retries = retries;
        self
    }

    pub fn segment_retry_delay(mut self, delay: Duration) -> Self {
        self.config.fetcher_config.segment_retry_delay = delay;
        self
    }

    pub fn max_playlist_depth(mut self, depth: usize) -> Self {
        self.config.playlist_config.max_playlist_depth = depth;
        self
    }

    /// Recognise an additional segment extension (leading dots are stripped).
    pub fn add_segment_extension(mut self, extension: impl AsRef<str>) -> Self {
        let extension = extension.as_ref().trim_start_matches('.').to_ascii_lowercase();
        if !extension.is_empty()
            && !self
                .config
                .playlist_config
                .segment_extensions
                .contains(&extension)
        {
            self.config.playlist_config.segment_extensions.push(extension);
        }
        self
    }

    pub fn key_failure_policy(mut self, policy: KeyFailurePolicy) -> Self {
        self.config.decryption_config.key_failure_policy = policy;
        self
    }

    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.config.output_config.allow_partial = allow;
        self
    }

    pub fn remove_segments(mut self, remove: bool) -> Self {
        self.config.output_config.remove_segments = remove;
        self
    }

    pub fn output_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.output_config.output_extension = extension.into();
        self
    }

    pub fn build(self) -> HlsConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let config = HlsConfig::default();
        assert_eq!(config.scheduler_config.download_concurrency, 24);
        assert_eq!(config.fetcher_config.max_segment_retries, 3);
        assert_eq!(
            config.fetcher_config.segment_retry_delay,
            Duration::from_secs(2)
        );
        assert_eq!(config.playlist_config.max_playlist_depth, 10);
        assert_eq!(config.playlist_config.segment_extensions, vec!["ts"]);
        assert_eq!(
            config.decryption_config.key_failure_policy,
            KeyFailurePolicy::Abort
        );
        assert!(!config.output_config.allow_partial);
    }

    #[test]
    fn extensions_are_normalised_and_deduplicated() {
        let config = HlsConfigBuilder::new()
            .add_segment_extension(".M4S")
            .add_segment_extension("ts")
            .add_segment_extension("")
            .build();
        assert_eq!(config.playlist_config.segment_extensions, vec!["ts", "m4s"]);
    }
}
