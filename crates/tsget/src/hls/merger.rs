// HLS Segment Merger: concatenates downloaded segment files into the final
// output artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::DownloadError;

/// `dir/base.ext`, or `dir/base_<YYYYmmddHHMMSS>.ext` when the former exists.
pub fn unique_output_path(dir: &Path, base: &str, ext: &str, now: DateTime<Local>) -> PathBuf {
    let candidate = dir.join(format!("{base}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }
    let stamped = dir.join(format!("{base}_{}.{ext}", now.format("%Y%m%d%H%M%S")));
    debug!(
        taken = %candidate.display(),
        path = %stamped.display(),
        "Output name taken, using timestamped name"
    );
    stamped
}

/// Sort key for a segment file name: the numeric stem first, so `100000.ts`
/// follows `99999.ts`.
fn merge_order(name: &str) -> (Option<u64>, &str) {
    let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
    (stem.parse().ok(), name)
}

/// Append every named segment of `segment_dir` to a new file at `output`.
///
/// Segments are concatenated in index order, taken from the numeric name
/// stem. `output` must not exist yet. Returns the number of bytes written.
pub async fn merge(
    segment_dir: &Path,
    names: &[String],
    output: &Path,
) -> Result<u64, DownloadError> {
    let mut ordered: Vec<&str> = names.iter().map(String::as_str).collect();
    ordered.sort_by_key(|name| merge_order(*name));

    let output_name = output.display().to_string();
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output)
        .await
        .map_err(|e| DownloadError::merge_io(&output_name, e))?;

    let mut total = 0u64;
    for name in ordered {
        let path = segment_dir.join(name);
        let mut segment = File::open(&path)
            .await
            .map_err(|e| DownloadError::merge_io(path.display().to_string(), e))?;
        total += tokio::io::copy(&mut segment, &mut out)
            .await
            .map_err(|e| DownloadError::merge_io(path.display().to_string(), e))?;
    }

    out.flush()
        .await
        .map_err(|e| DownloadError::merge_io(&output_name, e))?;

    info!(output = %output_name, segments = names.len(), bytes = total, "Segments merged");
    Ok(total)
}
