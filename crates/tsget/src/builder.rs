//! # Builder for DownloaderConfig
//!
//! Fluent construction of the request profile. The profile is assembled once
//! at startup and never mutated afterwards.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tsget_engine::DownloaderConfig;
//!
//! let config = DownloaderConfig::builder()
//!     .with_read_timeout(Duration::from_secs(5))
//!     .with_cookie("session=abc")
//!     .with_referer("https://example.com")
//!     .danger_accept_invalid_certs(true)
//!     .build();
//!
//! assert_eq!(config.headers.get("cookie").unwrap(), "session=abc");
//! assert!(config.danger_accept_invalid_certs);
//! ```

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER};
use tracing::warn;

use crate::DownloaderConfig;

/// Builder for creating DownloaderConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct DownloaderConfigBuilder {
    /// Internal config being built
    config: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: DownloaderConfig::default(),
        }
    }

    /// Set the overall timeout for the entire HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the read timeout (maximum time between receiving data chunks)
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header. Invalid names or values are ignored with a warning.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match (
            name.as_ref().parse::<HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.config.headers.insert(name, value);
            }
            _ => warn!(header = name.as_ref(), "Ignoring invalid header"),
        }
        self
    }

    /// Merge headers on top of the current ones; later values win.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.config.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set the `Cookie` header. An empty string leaves the profile untouched.
    pub fn with_cookie(self, cookie: impl AsRef<str>) -> Self {
        if cookie.as_ref().is_empty() {
            return self;
        }
        self.with_header(COOKIE, cookie)
    }

    /// Set the `Referer` header.
    pub fn with_referer(self, referer: impl AsRef<str>) -> Self {
        self.with_header(REFERER, referer)
    }

    /// Set whether to accept invalid certificates
    ///
    /// # Warning
    /// This is unsafe and should only be used for testing or in controlled environments.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.danger_accept_invalid_certs = accept;
        self
    }

    /// Build the DownloaderConfig instance
    pub fn build(self) -> DownloaderConfig {
        self.config
    }
}

impl Default for DownloaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
