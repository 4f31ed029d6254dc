use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("manifest parse error: {reason}")]
    ManifestParse { reason: String },

    #[error("manifest resolution failed at {url}: {reason}")]
    ManifestResolution { url: String, reason: String },

    #[error("failed to fetch decryption key from {url}: {reason}")]
    KeyFetchFailed { url: String, reason: String },

    #[error("decryption error: {reason}")]
    Decryption { reason: String },

    #[error("no media segments found in manifest {url}")]
    SegmentListEmpty { url: String },

    #[error("merge failed for {path}: {source}")]
    MergeIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("download incomplete: {} segment(s) failed ({})", .failed.len(), .failed.join(", "))]
    IncompleteDownload { failed: Vec<String> },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl DownloadError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn manifest_parse(reason: impl Into<String>) -> Self {
        Self::ManifestParse {
            reason: reason.into(),
        }
    }

    pub fn manifest_resolution(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ManifestResolution {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn decryption(reason: impl Into<String>) -> Self {
        Self::Decryption {
            reason: reason.into(),
        }
    }

    pub fn merge_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::MergeIo {
            path: path.into(),
            source,
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Network failures, timeouts and non-success statuses.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::HttpStatus { .. })
    }

    /// Whether a segment attempt that failed with this error is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::Configuration { .. }
            | Self::ManifestParse { .. }
            | Self::ManifestResolution { .. }
            | Self::KeyFetchFailed { .. }
            | Self::SegmentListEmpty { .. }
            | Self::IncompleteDownload { .. } => false,
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::Io { .. }
            | Self::Decryption { .. }
            | Self::MergeIo { .. } => true,
        }
    }
}
