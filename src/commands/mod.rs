//! CLI subcommand implementations

pub mod cycle;
pub mod monitor;
pub mod performance;
pub mod trades;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use forecast_trader::config::EngineConfig;
use forecast_trader::store::PositionStore;
use forecast_trader::Symbol;

/// Open the position store under the configured state directory
pub fn open_store(config: &EngineConfig) -> Result<Arc<PositionStore>> {
    let state_dir = Path::new(&config.store.state_dir);
    std::fs::create_dir_all(state_dir)?;

    let db_path = state_dir.join("forecast_trader.db");
    let json_path = state_dir.join("forecast_trader.json");

    let store = PositionStore::new(db_path, json_path, config.store.auto_backup)?;
    Ok(Arc::new(store))
}

/// Symbols from the CLI override or the config file
pub fn resolve_symbols(config: &EngineConfig, override_arg: Option<String>) -> Vec<Symbol> {
    match override_arg {
        Some(arg) => arg.split(',').map(|s| Symbol::new(s.trim())).collect(),
        None => config.trading.symbols(),
    }
}
