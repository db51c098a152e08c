use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use oflow_core::config::AppConfig;
use oflow_core::config_loader::ConfigLoader;
use oflow_core::traits::TradeStore;
use oflow_core::types::TradeFilter;
use oflow_data::{SnapshotRepository, TradeRepository};
use oflow_deribit::rest::DeribitRest;
use oflow_greeks::curve::{portfolio_delta, portfolio_gamma, price_grid, AggregationMode, CurveParams};
use oflow_ingestion::{run_backfill, run_live};
use oflow_oi::{capture_snapshots, run_reconcile};

#[derive(Parser)]
#[command(name = "oflow")]
#[command(about = "Options trade ingestion, OI reconciliation, and exposure curves", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume live option trades over WebSocket (runs until interrupted)
    Listen,
    /// Backfill historical trades for every non-expired option instrument
    Backfill {
        /// Restrict to a single underlying (e.g. "BTC")
        #[arg(long)]
        currency: Option<String>,
        /// Restrict to a single instrument (e.g. "BTC-27FEB26-50000-C")
        #[arg(long)]
        instrument: Option<String>,
    },
    /// Capture open-interest snapshots and reconcile them onto trades
    Oi,
    /// Compute aggregate delta and gamma curves around the index price
    Curves {
        /// Underlying to aggregate (e.g. "BTC")
        #[arg(long, default_value = "BTC")]
        currency: String,
        /// Weighting mode: "flow" or "structure"
        #[arg(long, default_value = "flow")]
        mode: AggregationMode,
        /// Only include trades executed within the last N hours
        #[arg(long)]
        hours_ago: Option<i64>,
        /// Force every trade into the expiry-day regime
        #[arg(long)]
        mock_0dte: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::load_from(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config))?;

    match cli.command {
        Commands::Listen => listen(config).await,
        Commands::Backfill {
            currency,
            instrument,
        } => backfill(config, currency, instrument).await,
        Commands::Oi => oi(config).await,
        Commands::Curves {
            currency,
            mode,
            hours_ago,
            mock_0dte,
        } => curves(config, &currency, mode, hours_ago, mock_0dte).await,
    }
}

async fn trade_store(config: &AppConfig) -> Result<TradeRepository> {
    let pool = oflow_data::connect(&config.database.url, config.database.max_connections).await?;
    Ok(TradeRepository::new(pool))
}

async fn listen(config: AppConfig) -> Result<()> {
    let store = Arc::new(trade_store(&config).await?);
    run_live(store, config.deribit, config.ingestion).await
}

async fn backfill(
    config: AppConfig,
    currency: Option<String>,
    instrument: Option<String>,
) -> Result<()> {
    let store = trade_store(&config).await?;
    let rest = DeribitRest::new(&config.deribit)?;

    let instruments = if let Some(instrument) = instrument {
        vec![instrument]
    } else {
        let currencies: Vec<String> = match currency {
            Some(c) => vec![c],
            None => config.deribit.currencies.clone(),
        };
        let mut names = Vec::new();
        for currency in &currencies {
            let listed = rest.option_instruments(currency).await?;
            names.extend(listed.into_iter().map(|i| i.instrument_name));
        }
        names
    };

    info!(instruments = instruments.len(), "Starting backfill");
    let stats = run_backfill(&rest, &store, &instruments, &config.ingestion, Utc::now()).await?;
    println!(
        "backfill: {} instruments, {} pages, {} trades written, {} failed",
        stats.instruments_processed,
        stats.pages_fetched,
        stats.trades_written,
        stats.failed_instruments.len()
    );
    Ok(())
}

async fn oi(config: AppConfig) -> Result<()> {
    let pool = oflow_data::connect(&config.database.url, config.database.max_connections).await?;
    let trades = TradeRepository::new(pool.clone());
    let snapshots = SnapshotRepository::new(pool);
    let rest = DeribitRest::new(&config.deribit)?;
    let now = Utc::now();

    let deactivated = trades.deactivate_expired(now).await?;
    println!("deactivated {deactivated} expired trades");

    let capture = capture_snapshots(&rest, &snapshots, &config.oi, &config.deribit.currencies, now)
        .await?;
    println!(
        "capture: {} considered, {} written, {} skipped recent",
        capture.instruments_considered, capture.snapshots_written, capture.skipped_recent
    );

    let reconcile = run_reconcile(&trades, &snapshots, &config.oi, now).await?;
    println!(
        "reconcile: {} instruments, {} trades updated, {} failed",
        reconcile.instruments_reconciled,
        reconcile.trades_updated,
        reconcile.failed_instruments.len()
    );

    Ok(())
}

/// Trade selection for curve aggregation: one underlying, active contracts
/// only, optionally time-boxed. Block trades are negotiated off-book and
/// stay out of both weighting modes.
fn curves_filter(currency: &str, hours_ago: Option<i64>, now: DateTime<Utc>) -> TradeFilter {
    TradeFilter {
        instrument_prefix: Some(format!("{currency}-")),
        after: hours_ago.map(|h| now - chrono::Duration::hours(h)),
        exclude_block_trades: true,
        active_only: true,
        ..TradeFilter::default()
    }
}

async fn curves(
    config: AppConfig,
    currency: &str,
    mode: AggregationMode,
    hours_ago: Option<i64>,
    mock_0dte: bool,
) -> Result<()> {
    let store = trade_store(&config).await?;
    let rest = DeribitRest::new(&config.deribit)?;
    let now = Utc::now();

    let index_name = format!("{}_usd", currency.to_lowercase());
    let index_price = rest.index_price(&index_name).await?;

    let filter = curves_filter(currency, hours_ago, now);
    let trades = store.find(&filter).await?;
    info!(
        trades = trades.len(),
        index_price,
        mode = mode.as_str(),
        "Computing exposure curves"
    );

    let greeks = &config.greeks;
    let grid = price_grid(
        index_price - greeks.grid_span,
        index_price + greeks.grid_span,
        greeks.grid_step,
    );

    let delta_params = CurveParams {
        risk_free_rate: greeks.risk_free_rate,
        min_time_hours: greeks.min_time_hours,
        tau_seconds: greeks.delta_tau_seconds,
        mock_0dte,
    };
    let gamma_params = CurveParams {
        tau_seconds: greeks.gamma_tau_seconds,
        ..delta_params.clone()
    };

    let delta = portfolio_delta(&grid, &trades, mode, &delta_params, now);
    let gamma = portfolio_gamma(&grid, &trades, mode, &gamma_params, now);

    let output = serde_json::json!({
        "currency": currency,
        "mode": mode.as_str(),
        "index_price": index_price,
        "grid": grid,
        "delta": delta,
        "gamma": gamma,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
