//! Crawlwire main entry point
//!
//! Command-line client that submits one crawl job to a crawl server and logs
//! the pages it sends back.

use anyhow::Context;
use clap::Parser;
use crawlwire::config::{apply_server_overrides, load_config_with_hash, Config};
use crawlwire::{analyzed_url_channel, page_channel, CrawlJob};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Crawlwire: submit a crawl job and follow its results
///
/// Reads a TOML job file, submits the job to the crawl server, and logs every
/// page the server streams back until the job ends. Ctrl-C cancels the job.
#[derive(Parser, Debug)]
#[command(name = "crawlwire")]
#[command(version = "1.0.0")]
#[command(about = "Client for a remote crawl server", long_about = None)]
struct Cli {
    /// Path to TOML job file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the server host from the job file
    #[arg(long)]
    host: Option<String>,

    /// Override the server port from the job file
    #[arg(long)]
    port: Option<u16>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the job file and show the request without submitting it
    #[arg(long, conflicts_with = "analyzed")]
    dry_run: bool,

    /// Also relay the server's analyzed-URL batches
    #[arg(long)]
    analyzed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading job file from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Job file loaded successfully (hash: {})", config_hash);

    apply_server_overrides(&mut config, cli.host, cli.port)
        .context("invalid server address override")?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_job(config, cli.analyzed).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawlwire=info,warn"),
            1 => EnvFilter::new("crawlwire=debug,info"),
            2 => EnvFilter::new("crawlwire=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the request that would be submitted
fn handle_dry_run(config: &Config) {
    let job = &config.job;
    let request = job.to_domain_opt();

    println!("=== Crawlwire Dry Run ===\n");

    println!("Server:");
    println!("  Endpoint: {}", config.server.endpoint());
    println!("  Buffer capacity: {}", config.client.buffer_capacity);
    println!("  Max message size: {} bytes", config.client.max_message_size);

    println!("\nJob:");
    println!("  Seed URL: {}", request.seed_url);
    println!("  Depth: {}", request.depth);
    println!("  Delay: {}s - {}s", request.min_delay, request.max_delay);
    println!("  Concurrent requests: {}", request.max_concurrent_requests);
    println!("  User agent: {}", request.useragent);
    println!("  Follow links: {}", !request.no_follow);
    if request.repeat {
        println!(
            "  Repeat every: {}s",
            request.frequency.as_ref().map(|d| d.seconds).unwrap_or(0)
        );
    }

    println!("\nCallback rules:");
    for rule in &request.callback_xpath_match {
        println!("  - xpath {} matches {}", rule.key, rule.value);
    }
    for rule in &request.callback_xpath_regexp {
        println!("  - xpath {} matches /{}/", rule.key, rule.value);
    }

    if request.login {
        println!("\nLogin:");
        println!("  URL: {}", request.login_url);
        println!("  Payload fields: {}", request.login_payload.len());
        println!("  Scripted: {}", !request.login_js.is_empty());
    }

    if request.chrome {
        println!("\nChrome:");
        println!("  DOM load time: {}s", request.dom_load_time);
    }

    println!("\n✓ Job file is valid");
}

/// Handles the main mode: runs the job and logs its pages
async fn handle_job(config: Config, analyzed: bool) -> anyhow::Result<()> {
    tracing::info!("Seed URL: {}", config.job.seed_url);

    let mut job = CrawlJob::from_config(config);
    let (tx, mut pages) = page_channel();
    job.set_page_channel(tx);
    job.start().await?;

    if analyzed {
        let (tx, mut batches) = analyzed_url_channel();
        job.relay_analyzed_urls(tx).await;
        tokio::spawn(async move {
            while let Some(batch) = batches.recv().await {
                for url in batch.url {
                    tracing::info!("Analyzed: {}", url);
                }
            }
        });
    }

    let handle = job.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling job");
            if let Err(e) = handle.stop().await {
                tracing::error!("Failed to cancel job: {}", e);
            }
        }
    });

    while let Some(page) = pages.recv().await {
        if page.success {
            tracing::info!(
                "{} {} ({} bytes)",
                page.httpstatuscode,
                page.url,
                page.content.len()
            );
        } else {
            tracing::warn!("{} failed: {}", page.url, page.error);
        }
    }

    match job.wait().await {
        Ok(summary) => {
            tracing::info!(
                "Job completed: {} pages received, {} delivered",
                summary.received,
                summary.delivered
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Job failed: {}", e);
            Err(e.into())
        }
    }
}
