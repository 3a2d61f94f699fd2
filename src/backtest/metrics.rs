use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{OrderRecord, Position, Side};

/// Record of a single closed trade for analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: Side,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: u64,
    pub net: f64,
    pub net_pct: f64,
    pub holding_period_minutes: i64,
}

impl TradeRecord {
    pub fn from_position(position: &Position) -> Option<Self> {
        let (exit_price, exit_time, net) = (
            position.exit_price?,
            position.exit_time?,
            position.realized_net?,
        );
        let invested = position.entry_price * position.quantity as f64;

        Some(Self {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_time: position.entry_time,
            exit_time,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            net,
            net_pct: if invested > 0.0 { net / invested * 100.0 } else { 0.0 },
            holding_period_minutes: (exit_time - position.entry_time).num_minutes(),
        })
    }
}

/// Aggregate results of one simulated session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestResults {
    pub total_orders: usize,
    pub total_trades: usize,
    /// Sum of entry notionals over all trades
    pub total_invested: f64,
    pub net_income: f64,
    pub roi_pct: f64,

    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub avg_holding_period_minutes: f64,

    pub trades: Vec<TradeRecord>,
}

impl BacktestResults {
    /// Aggregate the order ledger and the closed trade rows
    pub fn from_ledger(orders: &[OrderRecord], positions: &[Position]) -> Self {
        let trades: Vec<TradeRecord> = positions.iter().filter_map(TradeRecord::from_position).collect();

        let total_trades = trades.len();
        let total_invested: f64 = trades
            .iter()
            .map(|t| t.entry_price * t.quantity as f64)
            .sum();
        let net_income: f64 = trades.iter().map(|t| t.net).sum();
        let roi_pct = if total_invested > 0.0 {
            net_income / total_invested * 100.0
        } else {
            0.0
        };

        let wins: Vec<f64> = trades.iter().map(|t| t.net).filter(|n| *n > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.net).filter(|n| *n <= 0.0).collect();

        let total_wins: f64 = wins.iter().sum();
        let total_losses: f64 = losses.iter().map(|l| l.abs()).sum();

        let win_rate = if total_trades > 0 {
            wins.len() as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_holding_period_minutes = if total_trades > 0 {
            trades.iter().map(|t| t.holding_period_minutes).sum::<i64>() as f64 / total_trades as f64
        } else {
            0.0
        };

        Self {
            total_orders: orders.len(),
            total_trades,
            total_invested,
            net_income,
            roi_pct,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            avg_win: average(&wins),
            avg_loss: average(&losses).abs(),
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::min),
            profit_factor,
            max_drawdown: Self::calculate_drawdown(&trades),
            avg_holding_period_minutes,
            trades,
        }
    }

    /// Largest peak-to-trough fall of cumulative net income, in trade order
    fn calculate_drawdown(trades: &[TradeRecord]) -> f64 {
        let mut peak = 0.0_f64;
        let mut cumulative = 0.0;
        let mut max_dd = 0.0_f64;

        for trade in trades {
            cumulative += trade.net;
            peak = peak.max(cumulative);
            max_dd = max_dd.max(peak - cumulative);
        }

        max_dd
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self, title: &str) {
        println!("\n=== {} ===", title);
        println!("  Orders:                {}", self.total_orders);
        println!("  Trades:                {}", self.total_trades);
        println!("  Invested:              {:.2}", self.total_invested);
        println!(
            "  Net income:            {:.2} ({:+.2}%)",
            self.net_income, self.roi_pct
        );
        println!(
            "  Winning / losing:      {} / {} ({:.1}%)",
            self.winning_trades, self.losing_trades, self.win_rate
        );

        if self.total_trades > 0 {
            println!("  Average win / loss:    {:.2} / {:.2}", self.avg_win, self.avg_loss);
            println!("  Largest win / loss:    {:.2} / {:.2}", self.largest_win, self.largest_loss);
            println!("  Profit factor:         {:.2}", self.profit_factor);
            println!("  Max drawdown:          {:.2}", self.max_drawdown);
            println!(
                "  Average holding:       {:.1} minutes",
                self.avg_holding_period_minutes
            );
        }
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 12, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn closed(side: Side, entry: f64, exit: f64, quantity: u64, minutes: i64) -> Position {
        let mut position = Position {
            symbol: "IEX".to_string(),
            side,
            quantity,
            entry_price: entry,
            entry_time: at(10, 0),
            exit_price: Some(exit),
            exit_time: Some(at(10, 0) + chrono::Duration::minutes(minutes)),
            realized_net: None,
        };
        position.realized_net = Some(position.net_at(exit));
        position
    }

    fn order() -> OrderRecord {
        OrderRecord {
            order_id: "1".to_string(),
            time: at(10, 0),
            action: Action::Buy,
            symbol: "IEX".to_string(),
            quantity: 1,
            price: 100.0,
        }
    }

    #[test]
    fn test_results_with_mixed_trades() {
        let positions = vec![
            closed(Side::Long, 100.0, 110.0, 10, 30), // +100
            closed(Side::Short, 100.0, 95.0, 10, 60), // +50
            closed(Side::Long, 100.0, 97.0, 10, 90),  // -30
        ];
        let orders = vec![order(); 6];

        let results = BacktestResults::from_ledger(&orders, &positions);

        assert_eq!(results.total_orders, 6);
        assert_eq!(results.total_trades, 3);
        assert_eq!(results.winning_trades, 2);
        assert_eq!(results.losing_trades, 1);
        assert!((results.net_income - 120.0).abs() < 1e-9);
        assert!((results.total_invested - 3000.0).abs() < 1e-9);
        assert!((results.roi_pct - 4.0).abs() < 1e-9);
        assert!((results.profit_factor - 5.0).abs() < 1e-9);
        assert!((results.avg_holding_period_minutes - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_open_positions_are_not_trades() {
        let mut open = closed(Side::Long, 100.0, 110.0, 10, 30);
        open.exit_price = None;
        open.exit_time = None;
        open.realized_net = None;

        let results = BacktestResults::from_ledger(&[order()], &[open]);
        assert_eq!(results.total_trades, 0);
        assert_eq!(results.roi_pct, 0.0);
        assert_eq!(results.win_rate, 0.0);
    }

    #[test]
    fn test_drawdown_calculation() {
        let positions = vec![
            closed(Side::Long, 100.0, 110.0, 10, 10),  // +100
            closed(Side::Long, 100.0, 80.0, 10, 10),   // -200
            closed(Side::Long, 100.0, 105.0, 10, 10),  // +50
        ];

        let results = BacktestResults::from_ledger(&[], &positions);
        assert!((results.max_drawdown - 200.0).abs() < 1e-9);
        assert_eq!(results.largest_loss, -200.0);
    }
}
