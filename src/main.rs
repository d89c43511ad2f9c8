//! CLI entry point for the modcorpus crawler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use modcorpus::{ClientConfig, ContentWorker, Corpus, EnrichEngine, IndexClient, ProxyClient};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Modcorpus starting");

    let config = ClientConfig {
        index_url: args.index_url,
        proxy_url: args.proxy_url,
        parallelism: usize::from(args.parallelism),
        request_timeout: Duration::from_secs(args.timeout),
    };
    let http = config.http_client().context("building HTTP client")?;

    // Index pass: checkpointed, so a re-run with a valid checkpoint
    // never touches the network.
    let index = IndexClient::new(http.clone(), config.index_url.clone());
    let records = index
        .fetch(&args.checkpoint)
        .await
        .context("fetching index")?;

    let seed = Corpus::from_index(&records);
    info!(
        modules = seed.module_count(),
        versions = seed.version_count(),
        "index loaded"
    );

    // Enrichment pass.
    let proxy = Arc::new(ProxyClient::new(http, config.proxy_url.clone()));
    let content = match args.stats_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating stats dir {}", dir.display()))?;
            Some(Arc::new(ContentWorker::new(Arc::clone(&proxy), Some(dir))))
        }
        None => None,
    };
    let engine = EnrichEngine::new(proxy, content, config.parallelism)?;
    let (corpus, errors) = engine.enrich(seed).await?;

    if !errors.is_empty() {
        let report = errors
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(&args.error_log, report)
            .with_context(|| format!("writing error report {}", args.error_log.display()))?;
        warn!(
            errors = errors.len(),
            path = %args.error_log.display(),
            "enrichment finished with errors"
        );
    }

    corpus
        .write_json(&args.corpus_out)
        .with_context(|| format!("writing corpus {}", args.corpus_out.display()))?;

    info!(
        modules = corpus.module_count(),
        versions = corpus.version_count(),
        path = %args.corpus_out.display(),
        "corpus written"
    );

    // Nothing enriched and everything errored means the proxy was
    // effectively unreachable; surface that as a hard failure.
    if corpus.module_count() == 0 && !errors.is_empty() {
        bail!(
            "enrichment produced no results ({} errors); see {}",
            errors.len(),
            args.error_log.display()
        );
    }

    Ok(())
}
