// HLS Key Fetcher: locates the `#EXT-X-KEY` directive of a resolved manifest
// and retrieves the raw AES-128 key bytes.

use crate::downloader::HttpFetcher;
use crate::hls::playlist::{Manifest, resolve_reference};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};
use url::Url;

pub const KEY_DIRECTIVE: &str = "#EXT-X-KEY";

/// AES-128 key length in bytes.
pub const KEY_LEN: usize = 16;

static URI_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"URI="([^"]+)""#).expect("valid URI attribute regex"));

static METHOD_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"METHOD=([A-Za-z0-9\-]+)").expect("valid METHOD regex"));

#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey([u8; KEY_LEN]);

impl DecryptionKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for DecryptionKey {
    type Error = usize;

    /// Fails with the offending length.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; KEY_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| bytes.len())
    }
}

// Never print key material.
impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey(..)")
    }
}

/// Result of scanning a manifest for its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Found(DecryptionKey),
    /// The manifest carries no usable key directive.
    NotPresent,
    /// A key directive exists but its key could not be retrieved.
    FetchFailed { url: String, reason: String },
}

/// A usable key directive: its method and the raw `URI` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDirective<'a> {
    pub method: Option<&'a str>,
    pub uri: &'a str,
}

/// Parse one manifest line as a key directive.
///
/// Returns `None` for lines that are not key directives, that declare
/// `METHOD=NONE`, or that lack a `URI` attribute.
pub fn parse_key_directive(line: &str) -> Option<KeyDirective<'_>> {
    if !line.starts_with(KEY_DIRECTIVE) {
        return None;
    }
    let method = METHOD_ATTR
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());
    if method.is_some_and(|m| m.eq_ignore_ascii_case("NONE")) {
        debug!(line, "Key directive with METHOD=NONE, ignoring");
        return None;
    }
    let Some(uri) = URI_ATTR.captures(line).and_then(|c| c.get(1)) else {
        warn!(line, "Key directive without URI attribute, skipping");
        return None;
    };
    Some(KeyDirective {
        method,
        uri: uri.as_str(),
    })
}

pub struct KeyFetcher {
    fetcher: Arc<dyn HttpFetcher>,
}

impl KeyFetcher {
    pub fn new(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self { fetcher }
    }

    /// Scan `manifest_body` for key directives and fetch the first key that
    /// can be retrieved. Fetch failures are reported, never swallowed.
    pub async fn fetch_key(&self, base_url: &Url, manifest_body: &str) -> KeyOutcome {
        let mut last_failure = None;

        for directive in Manifest::new(manifest_body)
            .directives()
            .filter_map(parse_key_directive)
        {
            let key_url = match resolve_reference(base_url, directive.uri) {
                Ok(url) => url,
                Err(e) => {
                    warn!(uri = directive.uri, error = %e, "Unresolvable key URI");
                    last_failure = Some((directive.uri.to_string(), e.to_string()));
                    continue;
                }
            };

            info!(url = %key_url, method = ?directive.method, "Fetching decryption key");
            match self.fetcher.fetch_bytes(&key_url, "key").await {
                Ok(bytes) => match DecryptionKey::try_from(bytes.as_ref()) {
                    Ok(key) => return KeyOutcome::Found(key),
                    Err(len) => {
                        warn!(url = %key_url, len, "Key has the wrong length");
                        last_failure = Some((
                            key_url.to_string(),
                            format!("expected a {KEY_LEN}-byte key, got {len} bytes"),
                        ));
                    }
                },
                Err(e) => {
                    warn!(url = %key_url, error = %e, "Key fetch failed");
                    last_failure = Some((key_url.to_string(), e.to_string()));
                }
            }
        }

        match last_failure {
            Some((url, reason)) => KeyOutcome::FetchFailed { url, reason },
            None => {
                info!("No encryption key found, segments are treated as plaintext");
                KeyOutcome::NotPresent
            }
        }
    }
}
