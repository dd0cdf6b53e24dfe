use serde::{Deserialize, Serialize};

/// A long position. No shorting: quantity never goes below zero, and the
/// position is removed entirely when it reaches zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedPosition {
    pub ticker: String,
    pub quantity: u64,
    /// Weighted-average cost across all buys.
    pub avg_cost: f64,
    pub current_price: f64,
}

impl SimulatedPosition {
    pub fn new(ticker: &str, quantity: u64, fill_price: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            quantity,
            avg_cost: fill_price,
            current_price: fill_price,
        }
    }

    /// Fold another buy into the weighted-average cost.
    pub fn add_shares(&mut self, quantity: u64, fill_price: f64) {
        let total = self.quantity + quantity;
        if total > 0 {
            self.avg_cost = (self.avg_cost * self.quantity as f64
                + fill_price * quantity as f64)
                / total as f64;
        }
        self.quantity = total;
        self.current_price = fill_price;
    }

    pub fn market_value(&self) -> f64 {
        self.quantity as f64 * self.current_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.avg_cost) * self.quantity as f64
    }
}

/// Aggregated portfolio statistics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub starting_cash: f64,
    pub cash: f64,
    pub positions_value: f64,
    pub total_value: f64,
    pub total_return: f64,
    pub total_return_pct: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// 0-100 percentage of closed trades with positive realized P&L.
    pub win_rate: f64,
    pub realized_pnl: f64,
    pub max_drawdown_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_average_cost_across_buys() {
        let mut position = SimulatedPosition::new("AAPL", 10, 100.0);
        position.add_shares(10, 110.0);
        assert_eq!(position.quantity, 20);
        assert!((position.avg_cost - 105.0).abs() < 1e-9);
    }

    #[test]
    fn unrealized_pnl_tracks_current_price() {
        let mut position = SimulatedPosition::new("AAPL", 10, 100.0);
        position.current_price = 108.0;
        assert!((position.unrealized_pnl() - 80.0).abs() < 1e-9);
        assert!((position.market_value() - 1080.0).abs() < 1e-9);
    }
}
