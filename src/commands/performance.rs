//! Performance command implementation

use anyhow::Result;
use tracing::info;

use forecast_trader::config::EngineConfig;
use forecast_trader::engine::PositionManager;
use forecast_trader::Symbol;

pub fn run(config_path: String, window_days: i64, symbol: Option<String>) -> Result<()> {
    let config = EngineConfig::from_file(&config_path)?;
    let store = super::open_store(&config)?;
    let engine = PositionManager::new(config, store);

    let symbol = symbol.map(Symbol::new);
    let snapshot = engine.get_performance(window_days, symbol.as_ref())?;
    let balance = engine.get_balance(symbol.as_ref())?;
    let open = engine.get_active_positions(symbol.as_ref())?;

    let scope = symbol
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "all symbols".to_string());

    println!("\n{}", "=".repeat(60));
    println!("PERFORMANCE ({scope}, last {window_days} days)");
    println!("{}", "=".repeat(60));
    println!("Realized Balance:   {balance:.2}");
    println!("Open Positions:     {}", open.len());
    println!("Total Trades:       {}", snapshot.total_trades);
    println!("Winning Trades:     {}", snapshot.winning_trades);
    println!("Losing Trades:      {}", snapshot.losing_trades);
    println!("Win Rate:           {:.2}%", snapshot.win_rate * 100.0);
    println!("Gross P&L:          {:.2}", snapshot.total_pnl);
    println!("Net P&L:            {:.2}", snapshot.net_pnl);
    println!("Average Win:        {:.2}", snapshot.avg_win);
    println!("Average Loss:       {:.2}", snapshot.avg_loss);
    println!("Profit Factor:      {:.2}", snapshot.profit_factor);
    println!("Max Drawdown:       {:.2}%", snapshot.max_drawdown * 100.0);
    println!("{}", "=".repeat(60));

    info!("Performance snapshot computed over {window_days} days");
    Ok(())
}
