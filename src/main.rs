//! pcapvault CLI entry point.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use pcapvault::catalog::JsonCatalog;
use pcapvault::cli::{AppConfig, Args, Command, OutputFormat, PcapFileSink, PlanFormatter};
use pcapvault_core::{
    CloudObjectStore, DeliveryOrder, ExpiryWorker, ProcessOptions, Session, SessionReader,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    let config = AppConfig::load(args.config.as_deref())
        .await
        .context("Failed to load config")?
        .with_args(&args);

    let catalog = Arc::new(
        JsonCatalog::load(&args.catalog)
            .await
            .with_context(|| format!("Failed to open catalog: {}", args.catalog.display()))?,
    );
    let store = Arc::new(CloudObjectStore::new(config.store.clone()));

    match args.command {
        Command::Fetch {
            session,
            output,
            concurrency,
            max_packets,
            unordered,
        } => {
            let reader = SessionReader::new(config.engine, store, catalog);
            let mut options = ProcessOptions::default().with_concurrency(concurrency);
            if let Some(max) = max_packets {
                options = options.with_max_packets(max);
            }
            if unordered {
                options = options.with_order(DeliveryOrder::AsCompleted);
            }
            fetch(&reader, &session, &output, options, args.verbose > 0).await
        }
        Command::Plan {
            session,
            max_packets,
            format,
        } => {
            let reader = SessionReader::new(config.engine, store, catalog);
            plan(&reader, &session, max_packets, format).await
        }
        Command::Expire {
            retention_days,
            every,
        } => {
            let worker = ExpiryWorker::new(
                store,
                catalog,
                chrono::Duration::days(i64::from(retention_days)),
            );
            expire(worker, every).await
        }
    }
}

async fn read_session(path: &Path) -> Result<Session> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read session: {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse session: {}", path.display()))
}

async fn fetch(
    reader: &SessionReader,
    session_path: &Path,
    output: &Path,
    options: ProcessOptions,
    show_stats: bool,
) -> Result<()> {
    let session = read_session(session_path).await?;
    let file = File::create(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;

    let mut sink = PcapFileSink::new(BufWriter::new(file));
    let outcome = reader.process_session(session, &mut sink, options).await;
    let packets = sink.packets();
    sink.finish()
        .with_context(|| format!("Failed to write {}", output.display()))?;

    eprintln!("Wrote {} packets to {}", packets, output.display());

    if show_stats {
        let stats = outcome.stats;
        eprintln!(
            "Descriptors: {} (fetched {}, joined {}, cached {}, failed {}), skipped packets: {}",
            stats.descriptors,
            stats.fetched,
            stats.joined,
            stats.cache_served,
            stats.failed_descriptors,
            stats.skipped
        );
        if let Some(cache) = reader.cache_stats() {
            eprintln!("{}", cache.format_summary());
        }
    }

    match outcome.error {
        Some(e) => Err(anyhow::Error::new(e).context("Session incomplete")),
        None => Ok(()),
    }
}

async fn plan(
    reader: &SessionReader,
    session_path: &Path,
    max_packets: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let session = read_session(session_path).await?;
    let descriptors = reader
        .plan(&session, max_packets)
        .await
        .context("Failed to plan session")?;

    let mut stdout = io::stdout();
    PlanFormatter::new(format).write(&descriptors, &mut stdout)?;
    Ok(())
}

async fn expire(worker: ExpiryWorker, every: Option<u64>) -> Result<()> {
    let Some(secs) = every else {
        let report = worker
            .run_once(chrono::Utc::now())
            .await
            .context("Expiry pass failed")?;
        eprintln!(
            "Expired {} of {} files ({} already gone, {} failed)",
            report.deleted + report.missing,
            report.examined,
            report.missing,
            report.failed
        );
        return Ok(());
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    worker
        .with_interval(Duration::from_secs(secs.max(1)))
        .run(shutdown_rx)
        .await;
    Ok(())
}
