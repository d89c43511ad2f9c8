//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use modcorpus::config::{DEFAULT_INDEX_URL, DEFAULT_PARALLELISM, DEFAULT_PROXY_URL};

/// Crawl a module index and content proxy into a corpus.
///
/// Modcorpus paginates the append-only index, enriches every module
/// with version lists and manifest metadata from the proxy, and can
/// tokenize each version's source archive into frequency statistics.
#[derive(Parser, Debug)]
#[command(name = "modcorpus")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Index endpoint serving newline-delimited records
    #[arg(long, default_value = DEFAULT_INDEX_URL)]
    pub index_url: Url,

    /// Proxy endpoint serving version lists, manifests, and archives
    #[arg(long, default_value = DEFAULT_PROXY_URL)]
    pub proxy_url: Url,

    /// Concurrent enrichment slots (1-512)
    #[arg(short = 'p', long, default_value_t = DEFAULT_PARALLELISM as u16, value_parser = clap::value_parser!(u16).range(1..=512))]
    pub parallelism: u16,

    /// Per-request timeout in seconds (1-600)
    #[arg(short = 't', long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub timeout: u64,

    /// Index checkpoint file; a valid checkpoint skips the index pass
    #[arg(long, default_value = "index.json")]
    pub checkpoint: PathBuf,

    /// Output path for the enriched corpus
    #[arg(long, default_value = "corpus.json")]
    pub corpus_out: PathBuf,

    /// Output path for the per-item error report
    #[arg(long, default_value = "errors.log")]
    pub error_log: PathBuf,

    /// Directory for per-version token statistics; enables archive
    /// download and tokenizing
    #[arg(long)]
    pub stats_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["modcorpus"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.parallelism, 100); // DEFAULT_PARALLELISM
        assert_eq!(args.timeout, 30);
        assert_eq!(args.checkpoint, PathBuf::from("index.json"));
        assert!(args.stats_dir.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["modcorpus", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_parallelism_range_enforced() {
        let args = Args::try_parse_from(["modcorpus", "-p", "512"]).unwrap();
        assert_eq!(args.parallelism, 512);

        let result = Args::try_parse_from(["modcorpus", "-p", "0"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let result = Args::try_parse_from(["modcorpus", "-p", "513"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_urls_parse() {
        let args = Args::try_parse_from([
            "modcorpus",
            "--index-url",
            "http://localhost:8080/index",
            "--proxy-url",
            "http://localhost:8080",
        ])
        .unwrap();
        assert_eq!(args.index_url.as_str(), "http://localhost:8080/index");
    }

    #[test]
    fn test_cli_invalid_url_rejected() {
        let result = Args::try_parse_from(["modcorpus", "--index-url", "not a url"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_stats_dir_enables_content() {
        let args = Args::try_parse_from(["modcorpus", "--stats-dir", "mods"]).unwrap();
        assert_eq!(args.stats_dir, Some(PathBuf::from("mods")));
    }
}
