use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use error::AppError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tsget_engine::hls::{HlsConfigBuilder, HlsDownloader};
use tsget_engine::{DownloaderConfig, ReqwestFetcher};
use url::Url;

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressManager;
use utils::{create_dirs, format_bytes, format_duration, parse_headers, validate_output_name};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Record a failed run; must be called while the log file guard is alive.
fn log_failure(e: &AppError) {
    error!(error = ?e, "Application failed");
}

/// Parse and check the manifest URL given on the command line.
fn parse_manifest_url(input: &str) -> Result<Url, AppError> {
    let url = Url::parse(input.trim())
        .map_err(|e| AppError::InvalidInput(format!("invalid URL '{input}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(AppError::InvalidInput(format!(
            "unsupported URL scheme '{scheme}', expected http or https"
        ))),
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    let save_path = match &args.save_path {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    create_dirs(&save_path).await?;

    // Setup logging
    let _log_guard = utils::logging::init_logging(&save_path, args.verbose)?;

    run(args, save_path).await.inspect_err(log_failure)
}

async fn run(args: CliArgs, save_path: PathBuf) -> Result<(), AppError> {
    let url = parse_manifest_url(&args.url)?;
    let name = validate_output_name(&args.output)?.to_string();
    if args.concurrency == 0 {
        return Err(AppError::InvalidInput(
            "concurrency must be at least 1".to_string(),
        ));
    }

    info!("==================================================================");
    info!("tsget {} - segmented media downloader", env!("CARGO_PKG_VERSION"));
    info!("==================================================================");
    info!(url = %url, save_path = %save_path.display(), output = %name, "Starting download");

    // Log HTTP timeout settings
    info!(
        "HTTP timeout configuration: overall={}s, connect={}s, read={}s",
        args.timeout, args.connect_timeout, args.read_timeout
    );

    let referer = args.host_type.host_of(&url);
    info!(host_type = ?args.host_type, referer = %referer, "Derived request host");

    // Create common download configuration
    let download_config = DownloaderConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_read_timeout(Duration::from_secs(args.read_timeout))
        .with_referer(&referer)
        .with_cookie(&args.cookie)
        .with_headers(parse_headers(&args.headers))
        .danger_accept_invalid_certs(args.insecure)
        .build();

    // Create HLS-specific configuration
    let hls_config = args
        .extensions
        .iter()
        .fold(HlsConfigBuilder::new(), |builder, ext| {
            builder.add_segment_extension(ext)
        })
        .with_base_config(download_config)
        .download_concurrency(args.concurrency)
        .segment_retry_count(args.retry)
        .segment_retry_delay(Duration::from_secs(args.retry_delay))
        .max_playlist_depth(args.max_depth)
        .key_failure_policy(args.key_failure)
        .allow_partial(args.allow_partial)
        .remove_segments(args.remove_segments())
        .build();

    let fetcher = ReqwestFetcher::from_config(&hls_config.base)?;

    let cancel_token = CancellationToken::new();
    {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after in-flight attempts");
                token.cancel();
            }
        });
    }

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let progress_task = tokio::spawn(ProgressManager::new().run(events_rx));

    let downloader = HlsDownloader::with_fetcher(hls_config, Arc::new(fetcher))
        .with_cancellation_token(cancel_token)
        .with_events(events_tx);

    let result = downloader.download(&url, &save_path, &name).await;
    // Closing the channel lets the renderer finish.
    drop(downloader);
    let progress = progress_task
        .await
        .map_err(|e| AppError::Initialization(format!("progress renderer failed: {e}")))?;

    let report = result?;
    let output = report
        .output
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    info!(
        segments = report.outcomes.len(),
        completed = progress.completed,
        failed = progress.failed,
        retries = progress.retries,
        encrypted = report.encrypted,
        size = %format_bytes(report.merged_bytes),
        elapsed = %format_duration(report.elapsed),
        output = %output,
        "Download finished"
    );
    if !report.is_complete() {
        warn!(
            segment_dir = %report.segment_dir.display(),
            "Output is incomplete; failed segments were skipped"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https_urls() {
        assert!(parse_manifest_url("https://example.com/a/index.m3u8").is_ok());
        assert!(parse_manifest_url(" http://example.com/index.m3u8 ").is_ok());
    }

    #[test]
    fn failures_reach_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let appender = tracing_appender::rolling::never(dir.path(), "download.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .finish();

        let err = parse_manifest_url("not a url").unwrap_err();
        tracing::subscriber::with_default(subscriber, || log_failure(&err));
        drop(guard);

        let log = std::fs::read_to_string(dir.path().join("download.log")).unwrap();
        assert!(log.contains("Application failed"));
        assert!(log.contains("invalid URL"));
    }

    #[test]
    fn rejects_malformed_or_unsupported_urls() {
        assert!(matches!(
            parse_manifest_url("not a url"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_manifest_url("ftp://example.com/index.m3u8"),
            Err(AppError::InvalidInput(_))
        ));
    }
}
