//! Slippage models for simulated fills.

use replay_core::{SlippageConfig, SlippageModel};

/// Slippage fraction for an order, before direction is applied
/// (buys fill at `price * (1 + s)`, sells at `price * (1 - s)`).
///
/// The adaptive model widens for cheap stocks, where spreads are
/// proportionally larger, and for orders that are big relative to the day's
/// volume; the result is hard-capped.
pub fn fill_slippage(cfg: &SlippageConfig, price: f64, quantity: u64, daily_volume: u64) -> f64 {
    match cfg.model {
        SlippageModel::None => 0.0,
        SlippageModel::Fixed => cfg.slippage_pct,
        SlippageModel::Adaptive => {
            let mut slippage = cfg.slippage_pct;

            if price < 1.0 {
                slippage *= cfg.sub_dollar_mult;
            } else if price < 5.0 {
                slippage *= cfg.sub_five_mult;
            } else if price < 10.0 {
                slippage *= cfg.sub_ten_mult;
            }

            if daily_volume > 0 {
                let order_pct = quantity as f64 / daily_volume as f64;
                if order_pct > cfg.volume_impact_threshold {
                    slippage *= 1.0 + order_pct * cfg.volume_impact_scale;
                }
            }

            slippage.min(cfg.max_slippage_pct)
        }
    }
}
