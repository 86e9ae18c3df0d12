use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use combobook_rs::config::AppConfig;
use combobook_rs::market_data::adapters::http::HttpSnapshotSource;
use combobook_rs::market_data::router::BookRouter;
use combobook_rs::persist::json_file::JsonFileSink;
use combobook_rs::render::ConsoleSink;
use combobook_rs::telemetry;

/// Poll spot venues and print one combined order book per symbol.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (TOML); COMBOBOOK_* variables override it
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,
    /// Stop after this many cycles
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    cycles: Option<u64>,
    /// Run a single cycle and exit
    #[arg(long, conflicts_with = "cycles")]
    once: bool,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
    /// Prometheus port (only with the `metrics-exporter` feature)
    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let args = Args::parse();
    telemetry::init_tracing(&args.log);
    telemetry::init_metrics(args.metrics_port);

    let cfg = AppConfig::load(&args.config)
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?;
    info!(
        symbols = ?cfg.symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        venues = ?cfg.venues.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(),
        cycle_timeout_ms = cfg.fetch.cycle_timeout_ms,
        "Configuration loaded"
    );

    let source = Arc::new(HttpSnapshotSource::new()?);
    let mut router = BookRouter::from_config(&cfg, source);
    if cfg.output.render {
        router.add_sink(Box::new(ConsoleSink::from_config(&cfg.output, cfg.combine.netting)));
    }
    if let Some(path) = &cfg.output.json_path {
        router.add_sink(Box::new(JsonFileSink::new(path, cfg.output.save_every)));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, finishing current cycle");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                // keep the sender alive so the loop is not stopped
                std::future::pending::<()>().await;
            }
        }
    });

    let max_cycles = if args.once { Some(1) } else { args.cycles };
    let ran = router.run(shutdown_rx, max_cycles).await;
    info!(cycles = ran, "Done");
    Ok(())
}
