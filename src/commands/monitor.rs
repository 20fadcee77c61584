//! Monitor command implementation
//!
//! Stop-loss/take-profit sweep only: fetches the latest price per
//! symbol and closes breached positions. Intended for tighter
//! scheduling than the full cycle.

use anyhow::Result;
use tracing::{error, info};

use forecast_trader::config::EngineConfig;
use forecast_trader::engine::PositionManager;
use forecast_trader::feed::FeedClient;
use forecast_trader::{EngineError, Symbol};

pub fn run(config_path: String, symbols_override: Option<String>) -> Result<()> {
    info!("Starting exit monitor");

    let config = EngineConfig::from_file(&config_path)?;
    let symbols = super::resolve_symbols(&config, symbols_override);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_async(config, symbols))
}

async fn run_async(config: EngineConfig, symbols: Vec<Symbol>) -> Result<()> {
    let store = super::open_store(&config)?;
    let engine = PositionManager::new(config.clone(), store);
    let feed = FeedClient::new(config.feed.clone())?;

    let mut closed_total = 0usize;

    for symbol in &symbols {
        if engine.get_active_positions(Some(symbol))?.is_empty() {
            continue;
        }

        let price = match feed.get_price(symbol).await {
            Ok(p) => p,
            Err(e) => {
                error!("{e:#}");
                error!("{}", EngineError::PriceUnavailable(symbol.clone()));
                continue;
            }
        };

        let closed = engine.check_exits_and_close(&price)?;
        for position in &closed {
            info!(
                "{symbol}: closed #{} @ {:.2} ({})",
                position.id,
                price.price,
                position.exit_reason.as_deref().unwrap_or("-")
            );
        }
        closed_total += closed.len();
    }

    info!("Monitor completed: {closed_total} positions closed");
    Ok(())
}
