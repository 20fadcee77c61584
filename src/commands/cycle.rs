//! Cycle command implementation
//!
//! One full automation cycle per invocation: fetch the latest price
//! and forecast for each symbol, generate and execute a signal, then
//! run the stop/take and intelligent-closure sweeps. Retries are the
//! scheduler's job; a failed symbol aborts cleanly and the next
//! trigger picks it up again.

use anyhow::Result;
use tracing::{error, info};

use forecast_trader::config::EngineConfig;
use forecast_trader::engine::PositionManager;
use forecast_trader::feed::FeedClient;
use forecast_trader::{EngineError, Symbol};

pub fn run(config_path: String, symbols_override: Option<String>) -> Result<()> {
    info!("Starting automation cycle");

    let config = EngineConfig::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let symbols = super::resolve_symbols(&config, symbols_override);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_async(config, symbols))
}

async fn run_async(config: EngineConfig, symbols: Vec<Symbol>) -> Result<()> {
    let store = super::open_store(&config)?;
    store.save_config_snapshot(&config)?;

    let engine = PositionManager::new(config.clone(), store);
    let feed = FeedClient::new(config.feed.clone())?;

    let mut processed = 0usize;
    let mut failed = 0usize;

    for symbol in &symbols {
        match process_symbol(&engine, &feed, symbol).await {
            Ok(()) => processed += 1,
            Err(e) => {
                // No transition was attempted for this symbol; the
                // next scheduled cycle retries it.
                error!("Cycle failed for {symbol}: {e:#}");
                failed += 1;
            }
        }
    }

    let balance = engine.get_balance(None)?;
    let open = engine.get_active_positions(None)?;

    println!("\n{}", "=".repeat(60));
    println!("CYCLE SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Symbols processed:  {processed} ({failed} failed)");
    println!("Open positions:     {}", open.len());
    println!("Realized balance:   {balance:.2}");
    println!("{}", "=".repeat(60));

    info!("Cycle completed: {processed} processed, {failed} failed");
    Ok(())
}

async fn process_symbol(
    engine: &PositionManager,
    feed: &FeedClient,
    symbol: &Symbol,
) -> Result<()> {
    // Both fetches happen before any transition is attempted, so a
    // failed or timed-out fetch can never leave a position
    // half-modified.
    let price = match feed.get_price(symbol).await {
        Ok(p) => p,
        Err(e) => {
            error!("{e:#}");
            return Err(EngineError::PriceUnavailable(symbol.clone()).into());
        }
    };
    let prediction = match feed.get_prediction(symbol).await {
        Ok(p) => p,
        Err(e) => {
            error!("{e:#}");
            return Err(EngineError::NoPrediction(symbol.clone()).into());
        }
    };

    engine.update_market_price(price.clone())?;
    engine.update_prediction(prediction.clone())?;

    let signal = engine.generate_signal(symbol, Some(price.price))?;
    info!(
        "{symbol}: {} (conf={:.2}, diff={:.2}%, ret={:+.2}%)",
        signal.action,
        signal.confidence,
        signal.price_difference_pct * 100.0,
        signal.predicted_return * 100.0
    );

    if signal.review_low_confidence {
        info!("{symbol}: weak forecast, open positions due for closure review");
    }

    if let Some(position) = engine.execute_signal(&signal)? {
        info!("{symbol}: opened position #{}", position.id);
    }

    let exits = engine.check_exits_and_close(&price)?;
    for position in &exits {
        info!(
            "{symbol}: closed #{} ({})",
            position.id,
            position.exit_reason.as_deref().unwrap_or("-")
        );
    }

    let report = engine.check_intelligent_closures(&prediction, price.price)?;
    if report.closed_count > 0 {
        info!(
            "{symbol}: intelligent closure closed {}/{} positions",
            report.closed_count, report.checked
        );
    }

    Ok(())
}
