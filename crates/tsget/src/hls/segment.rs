// HLS Segment Lister: turns a leaf manifest into the ordered list of media
// segments to download.

use crate::hls::playlist::{Manifest, path_extension, resolve_reference};
use tracing::debug;
use url::Url;

/// One media segment, identified by its position in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    /// Zero-based manifest position; the only ordering key.
    pub index: usize,
    /// File name inside the segment directory, e.g. `00007.ts`.
    pub name: String,
    pub source_url: Url,
}

impl SegmentRef {
    pub fn new(index: usize, extension: &str, source_url: Url) -> Self {
        Self {
            index,
            name: segment_file_name(index, extension),
            source_url,
        }
    }
}

/// Index padded to at least five digits, e.g. `00042.ts` or `123456.ts`.
pub fn segment_file_name(index: usize, extension: &str) -> String {
    format!("{index:05}.{extension}")
}

pub fn list_segments(base_url: &Url, manifest_body: &str, extensions: &[String]) -> Vec<SegmentRef> {
    let mut segments = Vec::new();

    for reference in Manifest::new(manifest_body).uris() {
        let url = match resolve_reference(base_url, reference) {
            Ok(url) => url,
            Err(e) => {
                debug!(reference, error = %e, "Skipping unresolvable manifest line");
                continue;
            }
        };

        let Some(ext) = path_extension(&url).filter(|ext| {
            extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        }) else {
            debug!(reference, "Skipping non-segment manifest line");
            continue;
        };

        segments.push(SegmentRef::new(segments.len(), &ext, url));
    }

    debug!(count = segments.len(), base = %base_url, "Listed segments");
    segments
}
