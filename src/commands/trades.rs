//! Trades command implementation
//!
//! Lists recently closed trades and optionally exports them to CSV.

use anyhow::{Context, Result};
use tracing::info;

use forecast_trader::config::EngineConfig;
use forecast_trader::engine::PositionManager;
use forecast_trader::{Position, Symbol};

pub fn run(
    config_path: String,
    limit: usize,
    symbol: Option<String>,
    csv_path: Option<String>,
) -> Result<()> {
    let config = EngineConfig::from_file(&config_path)?;
    let store = super::open_store(&config)?;
    let engine = PositionManager::new(config, store);

    let symbol = symbol.map(Symbol::new);
    let trades = engine.get_recent_trades(limit, symbol.as_ref())?;

    if trades.is_empty() {
        println!("No closed trades recorded.");
        return Ok(());
    }

    println!("\n{}", "=".repeat(100));
    println!(
        "{:<5} {:<10} {:<6} {:>10} {:>10} {:>12} {:>10} {:>10}  {}",
        "ID", "SYMBOL", "SIDE", "ENTRY", "EXIT", "QTY", "NET P&L", "FEES", "REASON"
    );
    println!("{}", "=".repeat(100));
    for trade in &trades {
        println!(
            "{:<5} {:<10} {:<6} {:>10.2} {:>10.2} {:>12.6} {:>10.2} {:>10.2}  {}",
            trade.id,
            trade.symbol,
            trade.side,
            trade.entry_price,
            trade.exit_price.unwrap_or(0.0),
            trade.quantity,
            trade.net_pnl.unwrap_or(0.0),
            trade.fees,
            trade.exit_reason.as_deref().unwrap_or("-"),
        );
    }
    println!("{}", "=".repeat(100));

    if let Some(path) = csv_path {
        export_csv(&path, &trades)?;
        info!("Exported {} trades to {}", trades.len(), path);
        println!("Exported {} trades to {}", trades.len(), path);
    }

    Ok(())
}

fn export_csv(path: &str, trades: &[Position]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("Failed to create CSV file")?;

    writer.write_record([
        "id",
        "symbol",
        "side",
        "entry_price",
        "exit_price",
        "quantity",
        "gross_pnl",
        "fees",
        "net_pnl",
        "exit_reason",
        "opened_at",
        "closed_at",
    ])?;

    for trade in trades {
        writer.write_record([
            trade.id.to_string(),
            trade.symbol.to_string(),
            trade.side.to_string(),
            trade.entry_price.to_string(),
            trade.exit_price.unwrap_or(0.0).to_string(),
            trade.quantity.to_string(),
            trade.gross_pnl.unwrap_or(0.0).to_string(),
            trade.fees.to_string(),
            trade.net_pnl.unwrap_or(0.0).to_string(),
            trade.exit_reason.clone().unwrap_or_default(),
            trade.opened_at.to_rfc3339(),
            trade
                .closed_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        ])?;
    }

    writer.flush().context("Failed to flush CSV file")?;
    Ok(())
}
