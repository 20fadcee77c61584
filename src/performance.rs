//! Ledger and performance analytics
//!
//! Realized balance and performance metrics derived from the closed
//! trade history. Open positions never affect the balance; there is no
//! mark-to-market.

use crate::config::TradingConfig;
use crate::types::{PerformanceSnapshot, Position};

/// Computes realized balance from closed trade history. Balance for a
/// scope is always `initial_balance + Σ net_pnl` of the closed trades
/// in that scope.
#[derive(Debug, Clone)]
pub struct Ledger {
    initial_balance: f64,
}

impl Ledger {
    pub fn new(config: &TradingConfig) -> Self {
        Ledger {
            initial_balance: config.initial_balance,
        }
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Balance after the given closed trades
    pub fn balance(&self, closed: &[Position]) -> f64 {
        self.initial_balance + closed.iter().filter_map(|p| p.net_pnl).sum::<f64>()
    }

    /// Running balance after each trade, in the order given. Callers
    /// must pass trades in chronological close order for the
    /// trajectory to be meaningful.
    pub fn trajectory(&self, closed: &[Position]) -> Vec<f64> {
        let mut running = self.initial_balance;
        closed
            .iter()
            .map(|p| {
                running += p.net_pnl.unwrap_or(0.0);
                running
            })
            .collect()
    }
}

/// Derives win rate, profit factor, average win/loss, and maximum
/// drawdown from closed trades, using the ledger's balance trajectory.
#[derive(Debug, Clone)]
pub struct PerformanceCalculator {
    ledger: Ledger,
}

impl PerformanceCalculator {
    pub fn new(ledger: Ledger) -> Self {
        PerformanceCalculator { ledger }
    }

    /// Build a snapshot over closed trades in chronological close order
    pub fn snapshot(&self, closed: &[Position]) -> PerformanceSnapshot {
        if closed.is_empty() {
            return PerformanceSnapshot::default();
        }

        let total_trades = closed.len();
        let wins: Vec<f64> = closed
            .iter()
            .filter_map(|p| p.net_pnl)
            .filter(|pnl| *pnl > 0.0)
            .collect();
        let losses: Vec<f64> = closed
            .iter()
            .filter_map(|p| p.net_pnl)
            .filter(|pnl| *pnl <= 0.0)
            .collect();

        let winning_trades = wins.len();
        let losing_trades = losses.len();

        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let avg_win = if winning_trades > 0 {
            wins.iter().sum::<f64>() / winning_trades as f64
        } else {
            0.0
        };
        let avg_loss = if losing_trades > 0 {
            losses.iter().map(|l| l.abs()).sum::<f64>() / losing_trades as f64
        } else {
            0.0
        };

        // Ratio of average win to average loss; 0 when no losing
        // trades are recorded, avoiding division by zero
        let profit_factor = if avg_loss > 0.0 { avg_win / avg_loss } else { 0.0 };

        let total_pnl: f64 = closed.iter().filter_map(|p| p.gross_pnl).sum();
        let net_pnl: f64 = closed.iter().filter_map(|p| p.net_pnl).sum();

        PerformanceSnapshot {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            total_pnl,
            net_pnl,
            avg_win,
            avg_loss,
            profit_factor,
            max_drawdown: self.max_drawdown(closed),
        }
    }

    /// Replay closed trades chronologically, tracking the running
    /// balance and its running peak; report the deepest fractional
    /// decline from a peak (0 if the balance never dips).
    pub fn max_drawdown(&self, closed: &[Position]) -> f64 {
        let mut peak = self.ledger.initial_balance();
        let mut max_dd = 0.0;

        for balance in self.ledger.trajectory(closed) {
            if balance > peak {
                peak = balance;
            }
            if peak > 0.0 {
                let dd = (peak - balance) / peak;
                if dd > max_dd {
                    max_dd = dd;
                }
            }
        }

        max_dd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PositionStatus, Side, Symbol};
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn closed_trade(net_pnl: f64) -> Position {
        Position {
            id: 0,
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Long,
            entry_price: 100.0,
            quantity: 1.0,
            stop_loss: 95.0,
            take_profit: Some(115.0),
            status: PositionStatus::Closed,
            fees: 0.5,
            exit_price: Some(100.0 + net_pnl),
            gross_pnl: Some(net_pnl + 0.5),
            net_pnl: Some(net_pnl),
            exit_reason: Some("take_profit".to_string()),
            signal_confidence: 0.7,
            predicted_price: 103.0,
            opened_at: Utc::now(),
            closed_at: Some(Utc::now()),
        }
    }

    fn calculator(initial: f64) -> PerformanceCalculator {
        let config = TradingConfig {
            initial_balance: initial,
            ..TradingConfig::default()
        };
        PerformanceCalculator::new(Ledger::new(&config))
    }

    #[test]
    fn test_balance_is_initial_plus_net_pnl() {
        let config = TradingConfig {
            initial_balance: 10_000.0,
            ..TradingConfig::default()
        };
        let ledger = Ledger::new(&config);
        let trades = vec![closed_trade(100.0), closed_trade(-40.0)];
        assert_relative_eq!(ledger.balance(&trades), 10_060.0);
    }

    #[test]
    fn test_empty_history_yields_default_snapshot() {
        let snap = calculator(10_000.0).snapshot(&[]);
        assert_eq!(snap.total_trades, 0);
        assert_eq!(snap.win_rate, 0.0);
        assert_eq!(snap.profit_factor, 0.0);
        assert_eq!(snap.max_drawdown, 0.0);
    }

    #[test]
    fn test_win_rate_and_averages() {
        let trades = vec![
            closed_trade(100.0),
            closed_trade(50.0),
            closed_trade(-30.0),
            closed_trade(-60.0),
        ];
        let snap = calculator(10_000.0).snapshot(&trades);
        assert_eq!(snap.total_trades, 4);
        assert_eq!(snap.winning_trades, 2);
        assert_eq!(snap.losing_trades, 2);
        assert_relative_eq!(snap.win_rate, 0.5);
        assert_relative_eq!(snap.avg_win, 75.0);
        assert_relative_eq!(snap.avg_loss, 45.0);
        assert_relative_eq!(snap.profit_factor, 75.0 / 45.0);
    }

    #[test]
    fn test_profit_factor_zero_without_losses() {
        let trades = vec![closed_trade(100.0), closed_trade(20.0)];
        let snap = calculator(10_000.0).snapshot(&trades);
        assert_eq!(snap.profit_factor, 0.0);
    }

    #[test]
    fn test_max_drawdown_replay() {
        // 1000 -> 1100 (peak) -> 880 -> 990: deepest dip 220/1100 = 0.2
        let trades = vec![
            closed_trade(100.0),
            closed_trade(-220.0),
            closed_trade(110.0),
        ];
        let calc = calculator(1_000.0);
        assert_relative_eq!(calc.max_drawdown(&trades), 0.2);
    }

    #[test]
    fn test_max_drawdown_zero_when_monotonic() {
        let trades = vec![closed_trade(10.0), closed_trade(20.0)];
        assert_eq!(calculator(1_000.0).max_drawdown(&trades), 0.0);
    }

    #[test]
    fn test_max_drawdown_non_decreasing_with_more_losses() {
        let calc = calculator(1_000.0);
        let mut trades = vec![closed_trade(-50.0)];
        let mut previous = calc.max_drawdown(&trades);
        assert!(previous >= 0.0);

        // Appending losses without new peaks can only deepen the trough
        for _ in 0..5 {
            trades.push(closed_trade(-25.0));
            let dd = calc.max_drawdown(&trades);
            assert!(dd >= previous);
            previous = dd;
        }
    }
}
