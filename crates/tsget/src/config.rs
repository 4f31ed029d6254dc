use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_13_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.88 Safari/537.36";

/// How the `Referer` origin is derived from the manifest URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum HostMode {
    /// `scheme://host[:port]/directory/of/the/manifest`
    V1,
    /// `scheme://host[:port]`
    #[default]
    V2,
}

impl HostMode {
    /// Derive the host string for `url`.
    ///
    /// ```
    /// use tsget_engine::config::HostMode;
    /// use url::Url;
    ///
    /// let url = Url::parse("https://cdn.example.com:8443/live/a/index.m3u8").unwrap();
    /// assert_eq!(HostMode::V1.host_of(&url), "https://cdn.example.com:8443/live/a");
    /// assert_eq!(HostMode::V2.host_of(&url), "https://cdn.example.com:8443");
    /// ```
    pub fn host_of(&self, url: &Url) -> String {
        let origin = url.origin().ascii_serialization();
        match self {
            HostMode::V2 => origin,
            HostMode::V1 => {
                let path = url.path();
                let dir = match path.rfind('/') {
                    Some(pos) => &path[..pos],
                    None => "",
                };
                format!("{origin}{dir}")
            }
        }
    }
}

/// Immutable request profile shared by every HTTP call of a run.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Overall timeout for a single request; zero disables it
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    pub danger_accept_invalid_certs: bool, // For reqwest's `danger_accept_invalid_certs`
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(0),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: DownloaderConfig::get_default_headers(),
            danger_accept_invalid_certs: false,
        }
    }
}

impl DownloaderConfig {
    pub fn builder() -> crate::builder::DownloaderConfigBuilder {
        crate::builder::DownloaderConfigBuilder::new()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("*"),
        );

        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9, en;q=0.8, de;q=0.7, *;q=0.5"),
        );
        default_headers
    }
}
