use clap::Parser;
use std::path::PathBuf;
use tsget_engine::HostMode;
use tsget_engine::hls::KeyFailurePolicy;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Segmented media (HLS) downloader",
    long_about = "Downloads every segment listed by an m3u8 manifest, decrypts AES-128 \
                  encrypted segments and merges them into a single file.\n\
                  \n\
                  Nested (master) manifests are followed automatically. Segments are \
                  downloaded concurrently and retried individually on failure."
)]
pub struct CliArgs {
    /// Manifest URL
    #[arg(short, long, help = "URL of the m3u8 manifest to download")]
    pub url: String,

    /// Number of concurrent segment downloads
    #[arg(
        short = 'n',
        long,
        default_value = "24",
        help = "Maximum number of segments downloaded at the same time"
    )]
    pub concurrency: usize,

    /// How the Referer header is derived from the manifest URL
    #[arg(
        long = "host-type",
        visible_alias = "ht",
        value_enum,
        default_value_t = HostMode::V2,
        help = "Referer derivation: v1 = origin plus manifest directory, v2 = origin only"
    )]
    pub host_type: HostMode,

    /// Output file name, without extension
    #[arg(
        short,
        long,
        default_value = "movie",
        help = "Name of the merged file (without extension) and of the segment directory"
    )]
    pub output: String,

    /// Cookie header value
    #[arg(short, long, default_value = "", help = "Cookie sent with every request")]
    pub cookie: String,

    /// Remove the segment directory after merging
    #[arg(
        short,
        long,
        default_value = "y",
        value_parser = ["y", "n"],
        help = "Remove downloaded segments after a successful merge (y/n)"
    )]
    pub remove_segments: String,

    /// Skip TLS certificate verification
    #[arg(short = 's', long, help = "Accept invalid TLS certificates")]
    pub insecure: bool,

    /// Directory where the output is written
    #[arg(
        long = "save-path",
        visible_alias = "sp",
        help = "Directory for segments, output and log file (default: current directory)"
    )]
    pub save_path: Option<PathBuf>,

    /// Retries per segment
    #[arg(
        long,
        default_value = "3",
        help = "Number of retry attempts for a failed segment"
    )]
    pub retry: u32,

    /// Delay between segment retries in seconds
    #[arg(
        long,
        default_value = "2",
        help = "Seconds to wait before retrying a failed segment"
    )]
    pub retry_delay: u64,

    /// Read timeout in seconds
    #[arg(
        long,
        default_value = "5",
        help = "Read timeout in seconds (maximum time between receiving data chunks)"
    )]
    pub read_timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Overall request timeout in seconds
    #[arg(
        long,
        default_value = "0",
        help = "Overall timeout in seconds for a single HTTP request (0 disables it)"
    )]
    pub timeout: u64,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// What to do when the decryption key cannot be fetched
    #[arg(
        long,
        value_enum,
        default_value_t = KeyFailurePolicy::Abort,
        help = "On key fetch failure: abort the run, or proceed without decryption"
    )]
    pub key_failure: KeyFailurePolicy,

    /// Merge even when some segments failed
    #[arg(
        long,
        help = "Merge the successful segments even if some failed permanently"
    )]
    pub allow_partial: bool,

    /// Extra segment extensions
    #[arg(
        long = "ext",
        value_name = "EXT",
        help = "Additional segment file extension to recognise besides ts (can be used multiple times)"
    )]
    pub extensions: Vec<String>,

    /// Maximum manifest nesting depth
    #[arg(
        long,
        default_value = "10",
        help = "Maximum number of nested manifests to follow"
    )]
    pub max_depth: usize,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

impl CliArgs {
    pub fn remove_segments(&self) -> bool {
        self.remove_segments == "y"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["tsget", "-u", "http://h/index.m3u8"]).unwrap();
        assert_eq!(args.concurrency, 24);
        assert_eq!(args.host_type, HostMode::V2);
        assert_eq!(args.output, "movie");
        assert!(args.remove_segments());
        assert!(!args.insecure);
        assert_eq!(args.retry, 3);
        assert_eq!(args.read_timeout, 5);
        assert_eq!(args.key_failure, KeyFailurePolicy::Abort);
        assert!(args.save_path.is_none());
    }

    #[test]
    fn short_and_alias_flags() {
        let args = CliArgs::try_parse_from([
            "tsget",
            "-u",
            "http://h/index.m3u8",
            "-n",
            "8",
            "--ht",
            "v1",
            "-r",
            "n",
            "-s",
            "--sp",
            "/tmp/out",
            "-H",
            "X-A: 1",
            "-H",
            "X-B: 2",
            "--key-failure",
            "proceed",
            "--ext",
            "m4s",
        ])
        .unwrap();
        assert_eq!(args.concurrency, 8);
        assert_eq!(args.host_type, HostMode::V1);
        assert!(!args.remove_segments());
        assert!(args.insecure);
        assert_eq!(args.save_path, Some(PathBuf::from("/tmp/out")));
        assert_eq!(args.headers.len(), 2);
        assert_eq!(args.key_failure, KeyFailurePolicy::ProceedUnencrypted);
        assert_eq!(args.extensions, ["m4s"]);
    }

    #[test]
    fn url_is_required() {
        assert!(CliArgs::try_parse_from(["tsget"]).is_err());
        assert!(CliArgs::try_parse_from(["tsget", "-u", "x", "-r", "maybe"]).is_err());
    }
}
