use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use rs_block_spider::{
    chains::evm::{
        client::EvmClient, context::CrawlerContext, crawler::EvmCrawler, import_log::ImportLogger,
    },
    cli::{Cli, Commands},
    config::AppConfig,
    core::{crawler::Crawler, error::CrawlError},
    storage::{
        manager::{CrawlerStateStorage, CrawlerStorageManager},
        rocksdb::RocksDBStorage,
    },
    utils::{
        logger::init_logger,
        metrics::{CrawlerMetrics, NoopCrawlerMetrics, PrometheusCrawlerMetrics},
    },
};
use tokio::sync::broadcast;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let mut cfg = AppConfig::load(&args.config)?;
    if let Some(level) = &args.log_level {
        cfg.logging.level = level.clone();
    }

    match args.command() {
        Commands::State => print_state(&cfg),
        Commands::Run => run(cfg).await,
    }
}

fn print_state(cfg: &AppConfig) -> Result<()> {
    let storage = Arc::new(RocksDBStorage::open_read_only(&cfg.storage.path)?);
    let state = CrawlerStateStorage {
        storage,
        chain: cfg.crawler.chain_name.clone(),
    }
    .get()?;

    match state {
        Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
        None => println!("No crawler state stored for chain {}", cfg.crawler.chain_name),
    }
    Ok(())
}

async fn run(cfg: AppConfig) -> Result<()> {
    init_logger(&cfg.logging)?;

    info!("✅ Configuration load successful");
    info!(chain_name = %cfg.crawler.chain_name, "Chain name");
    info!(routines = cfg.crawler.routines, cache_limit = cfg.crawler.cache_limit, "Crawler limits");
    info!(rpc_url = %cfg.rpc.url, "RPC node");

    let metrics: Arc<dyn CrawlerMetrics> = if cfg.metrics.enable {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], cfg.metrics.prometheus_exporter_port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(
            port = cfg.metrics.prometheus_exporter_port,
            "📈 Prometheus exporter listening"
        );
        Arc::new(PrometheusCrawlerMetrics::new(cfg.crawler.chain_name.clone()))
    } else {
        Arc::new(NoopCrawlerMetrics::new())
    };

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let shutdown_tx_sigint = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }

        info!("📡 Received shutdown signal (Ctrl+C)");
        let _ = shutdown_tx_sigint.send(());
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_tx_sigterm = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                info!("📡 Received SIGTERM signal");
                let _ = shutdown_tx_sigterm.send(());
            }
        });
    }

    let client = Arc::new(EvmClient::new(&cfg.rpc.url, cfg.rpc.timeout())?);
    let version = client.client_version().await?;
    info!(version = %version, "✅ Connected to RPC node");
    if let Some(expected) = cfg.crawler.chain_id {
        let actual = client.chain_id().await?;
        if actual != expected {
            return Err(CrawlError::Config(format!(
                "RPC node reports chain id {actual}, configured chain id is {expected}"
            ))
            .into());
        }
    }

    let storage = Arc::new(RocksDBStorage::new(&cfg.storage.path)?);
    let manager = Arc::new(CrawlerStorageManager::new(
        storage,
        cfg.crawler.chain_name.clone(),
    )?);
    info!("✅ Storage initialized at: {}", cfg.storage.path);

    let ctx = CrawlerContext::new(
        Arc::new(cfg.crawler.clone()),
        client,
        manager.clone(),
        manager.state.clone(),
        metrics,
    );
    let imports = ImportLogger::start(cfg.crawler.chain_name.clone());
    let crawler = EvmCrawler::new(ctx, imports.handle());

    let state = crawler.init().await?;
    info!(head = state.head.number, hash = %state.head.hash, "🚀 Starting EVM block crawler...");
    info!("💡 Press Ctrl+C to stop gracefully");

    let result = crawler.run(shutdown_rx).await;
    drop(crawler);
    imports.close().await;
    if let Err(e) = manager.storage.flush() {
        error!("Failed to flush storage: {e:#}");
    }

    result?;
    info!("✨ Crawler exited successfully");
    Ok(())
}
