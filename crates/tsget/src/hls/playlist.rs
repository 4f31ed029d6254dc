// HLS Playlist Resolver: fetches a manifest and follows nested manifest
// references until a leaf (segment-listing) manifest is reached.

use crate::DownloadError;
use crate::downloader::HttpFetcher;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Marker that starts every directive line.
pub const DIRECTIVE_MARKER: char = '#';

const PLAYLIST_EXTENSIONS: [&str; 2] = ["m3u8", "m3u"];

/// A single classified manifest line, trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestLine<'a> {
    Directive(&'a str),
    Uri(&'a str),
    Blank,
}

impl<'a> ManifestLine<'a> {
    pub fn classify(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            ManifestLine::Blank
        } else if line.starts_with(DIRECTIVE_MARKER) {
            ManifestLine::Directive(line)
        } else {
            ManifestLine::Uri(line)
        }
    }
}

/// Borrowed, line-oriented view over a manifest body.
#[derive(Debug, Clone, Copy)]
pub struct Manifest<'a> {
    body: &'a str,
}

impl<'a> Manifest<'a> {
    pub fn new(body: &'a str) -> Self {
        Self { body }
    }

    pub fn lines(self) -> impl Iterator<Item = ManifestLine<'a>> + 'a {
        self.body.lines().map(ManifestLine::classify)
    }

    pub fn directives(self) -> impl Iterator<Item = &'a str> + 'a {
        self.lines().filter_map(|line| match line {
            ManifestLine::Directive(d) => Some(d),
            _ => None,
        })
    }

    pub fn uris(self) -> impl Iterator<Item = &'a str> + 'a {
        self.lines().filter_map(|line| match line {
            ManifestLine::Uri(u) => Some(u),
            _ => None,
        })
    }
}

/// Resolve a (possibly relative) manifest reference against the manifest's own URL.
pub fn resolve_reference(base: &Url, reference: &str) -> Result<Url, DownloadError> {
    base.join(reference).map_err(|e| {
        DownloadError::manifest_parse(format!(
            "could not resolve reference `{reference}` against {base}: {e}"
        ))
    })
}

/// Lower-cased extension of the last path segment, if any.
pub fn path_extension(url: &Url) -> Option<String> {
    let file_name = url.path_segments()?.next_back()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_playlist_url(url: &Url) -> bool {
    path_extension(url).is_some_and(|ext| PLAYLIST_EXTENSIONS.contains(&ext.as_str()))
}

/// First reference in `body` that points at another manifest.
pub fn find_nested_playlist(base: &Url, body: &str) -> Option<Url> {
    Manifest::new(body)
        .uris()
        .filter_map(|reference| match resolve_reference(base, reference) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!(error = %e, "Skipping unresolvable reference");
                None
            }
        })
        .find(is_playlist_url)
}

/// Leaf manifest and the URL its relative references resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlaylist {
    pub url: Url,
    pub body: String,
    /// Number of nested references followed to reach this manifest.
    pub depth: usize,
}

pub struct PlaylistResolver {
    fetcher: Arc<dyn HttpFetcher>,
    max_depth: usize,
}

impl PlaylistResolver {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, max_depth: usize) -> Self {
        Self { fetcher, max_depth }
    }

    /// Fetch `url` and follow nested manifests until a leaf is reached.
    ///
    /// The first nested reference of each manifest wins. Revisiting a URL or
    /// following more than `max_depth` references fails with
    /// [`DownloadError::ManifestResolution`]. A failure to fetch the root
    /// manifest is returned as-is; a failure further down is wrapped in
    /// `ManifestResolution`.
    pub async fn resolve(&self, url: &Url) -> Result<ResolvedPlaylist, DownloadError> {
        info!(url = %url, "Fetching manifest");
        let mut body = self.fetcher.fetch_text(url, "playlist").await?;
        if body.trim().is_empty() {
            return Err(DownloadError::manifest_parse(format!(
                "manifest at {url} is empty"
            )));
        }

        let mut current = url.clone();
        let mut visited = HashSet::from([current.clone()]);
        let mut depth = 0usize;

        while let Some(nested) = find_nested_playlist(&current, &body) {
            depth += 1;
            if depth > self.max_depth {
                return Err(DownloadError::manifest_resolution(
                    nested.as_str(),
                    format!("maximum nesting depth of {} exceeded", self.max_depth),
                ));
            }
            if !visited.insert(nested.clone()) {
                return Err(DownloadError::manifest_resolution(
                    nested.as_str(),
                    format!("playlist cycle detected (referenced from {current})"),
                ));
            }

            info!(url = %nested, depth, "Following nested manifest");
            body = self
                .fetcher
                .fetch_text(&nested, "nested playlist")
                .await
                .map_err(|e| DownloadError::manifest_resolution(nested.as_str(), e.to_string()))?;
            current = nested;
        }

        debug!(url = %current, depth, lines = body.lines().count(), "Resolved leaf manifest");
        Ok(ResolvedPlaylist {
            url: current,
            body,
            depth,
        })
    }
}
