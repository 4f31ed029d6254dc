use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::AppError;

pub const LOG_FILE_NAME: &str = "download.log";

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,tsget=debug,tsget_engine=debug"
    } else {
        "info"
    }
}

/// Install the global subscriber: console output routed around the progress
/// bar, plus a plain-text log appended to `log_dir/download.log`.
///
/// Keep the returned guard alive until exit so buffered file output is flushed.
pub fn init_logging(log_dir: &Path, verbose: bool) -> Result<WorkerGuard, AppError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(indicatif_layer)
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    Ok(guard)
}
