use std::collections::HashMap;

use replay_core::SlippageConfig;
use sim_clock::SharedClock;

use crate::order::{OrderSide, OrderStatus, OrderType, SimulatedOrder};
use crate::portfolio::{PortfolioStats, SimulatedPosition};
use crate::slippage::fill_slippage;

/// Latest known market state for one ticker.
struct Quote {
    price: f64,
    /// Whole-day volume seeded from the feed at setup.
    daily_volume: u64,
    /// Volume accumulated from price updates during the session.
    session_volume: u64,
}

impl Quote {
    fn known_volume(&self) -> u64 {
        self.daily_volume.max(self.session_volume)
    }
}

/// Synthetic broker: validates orders, fills them with slippage, and keeps
/// the portfolio books. Rejections are returned on the order, never raised,
/// so strategy code can branch on outcome without error handling.
pub struct SimulatedBroker {
    clock: SharedClock,
    starting_cash: f64,
    cash: f64,
    positions: HashMap<String, SimulatedPosition>,
    orders: HashMap<String, SimulatedOrder>,
    order_ids: Vec<String>,
    pending_limits: Vec<String>,
    quotes: HashMap<String, Quote>,
    slippage: SlippageConfig,
    max_volume_pct: f64,
    total_trades: u32,
    winning_trades: u32,
    losing_trades: u32,
    realized_pnl: f64,
    peak_value: f64,
    max_drawdown_pct: f64,
}

impl SimulatedBroker {
    pub fn new(
        clock: SharedClock,
        starting_cash: f64,
        slippage: SlippageConfig,
        max_volume_pct: f64,
    ) -> Self {
        Self {
            clock,
            starting_cash,
            cash: starting_cash,
            positions: HashMap::new(),
            orders: HashMap::new(),
            order_ids: Vec::new(),
            pending_limits: Vec::new(),
            quotes: HashMap::new(),
            slippage,
            max_volume_pct,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            realized_pnl: 0.0,
            peak_value: starting_cash,
            max_drawdown_pct: 0.0,
        }
    }

    /// Seed the whole-day volume for a ticker so the volume cap binds from
    /// the first order of the session.
    pub fn seed_daily_volume(&mut self, ticker: &str, volume: u64) {
        self.quotes
            .entry(ticker.to_string())
            .or_insert(Quote {
                price: 0.0,
                daily_volume: 0,
                session_volume: 0,
            })
            .daily_volume = volume;
    }

    /// Refresh a ticker's price, re-check pending limit orders against it,
    /// and update drawdown tracking.
    pub fn update_price(&mut self, ticker: &str, price: f64, volume: u64) {
        let quote = self.quotes.entry(ticker.to_string()).or_insert(Quote {
            price,
            daily_volume: 0,
            session_volume: 0,
        });
        quote.price = price;
        quote.session_volume += volume;

        if let Some(position) = self.positions.get_mut(ticker) {
            position.current_price = price;
        }

        self.check_pending_limits(ticker, price);
        self.update_drawdown();
    }

    /// Submit an order. MARKET fills immediately against the last known
    /// price; LIMIT stays PENDING until a later price update satisfies it.
    pub fn submit_order(
        &mut self,
        ticker: &str,
        side: OrderSide,
        quantity: u64,
        order_type: OrderType,
        limit_price: Option<f64>,
    ) -> SimulatedOrder {
        let mut order = SimulatedOrder::new(
            ticker,
            side,
            quantity,
            order_type,
            limit_price,
            self.clock.now(),
        );

        match self.validate(&order) {
            Ok(market_price) => match order_type {
                OrderType::Market => {
                    self.fill(&mut order, market_price);
                    self.update_drawdown();
                }
                OrderType::Limit => {
                    // Stays PENDING even if the limit is already satisfied;
                    // fills only on a subsequent price update.
                    self.pending_limits.push(order.id.clone());
                }
            },
            Err(reason) => {
                tracing::debug!(ticker, %side, quantity, reason, "Order rejected");
                order = order.reject(reason);
            }
        }

        self.order_ids.push(order.id.clone());
        self.orders.insert(order.id.clone(), order.clone());
        order
    }

    /// Cancel a pending order. Terminal orders are left untouched.
    pub fn cancel_order(&mut self, order_id: &str) -> Option<SimulatedOrder> {
        let order = self.orders.get_mut(order_id)?;
        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Cancelled;
            self.pending_limits.retain(|id| id != order_id);
        }
        Some(order.clone())
    }

    pub fn get_order(&self, order_id: &str) -> Option<&SimulatedOrder> {
        self.orders.get(order_id)
    }

    pub fn orders_count(&self) -> usize {
        self.orders.len()
    }

    pub fn open_orders(&self) -> Vec<&SimulatedOrder> {
        self.pending_limits
            .iter()
            .filter_map(|id| self.orders.get(id))
            .collect()
    }

    pub fn positions(&self) -> &HashMap<String, SimulatedPosition> {
        &self.positions
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Validation: returns the market price to fill against, or the
    /// rejection reason.
    fn validate(&self, order: &SimulatedOrder) -> Result<f64, String> {
        if order.quantity == 0 {
            return Err("Order quantity must be positive".to_string());
        }
        if order.order_type == OrderType::Limit && order.limit_price.is_none() {
            return Err("Limit order requires a limit price".to_string());
        }

        let quote = self
            .quotes
            .get(&order.ticker)
            .filter(|q| q.price > 0.0)
            .ok_or_else(|| format!("No price data for {}", order.ticker))?;

        match order.side {
            OrderSide::Buy => {
                let cost = order.quantity as f64 * quote.price;
                if cost > self.cash {
                    return Err(format!(
                        "Insufficient funds: need ${cost:.2}, have ${:.2}",
                        self.cash
                    ));
                }
            }
            OrderSide::Sell => {
                let held = self
                    .positions
                    .get(&order.ticker)
                    .map(|p| p.quantity)
                    .unwrap_or(0);
                if order.quantity > held {
                    return Err(format!(
                        "Insufficient shares: have {held}, tried to sell {}",
                        order.quantity
                    ));
                }
            }
        }

        let known_volume = quote.known_volume();
        if known_volume > 0
            && self.max_volume_pct > 0.0
            && order.quantity as f64 > known_volume as f64 * self.max_volume_pct
        {
            return Err(format!(
                "Order size {} exceeds {:.1}% of daily volume ({known_volume})",
                order.quantity,
                self.max_volume_pct * 100.0
            ));
        }

        Ok(quote.price)
    }

    /// Execute the entire order quantity at the slippage-adjusted price.
    fn fill(&mut self, order: &mut SimulatedOrder, market_price: f64) {
        let daily_volume = self
            .quotes
            .get(&order.ticker)
            .map(|q| q.known_volume())
            .unwrap_or(0);
        let slip = fill_slippage(&self.slippage, market_price, order.quantity, daily_volume);
        let fill_price = match order.side {
            OrderSide::Buy => market_price * (1.0 + slip),
            OrderSide::Sell => market_price * (1.0 - slip),
        };
        let notional = order.quantity as f64 * fill_price;

        match order.side {
            OrderSide::Buy => {
                self.cash -= notional;
                self.positions
                    .entry(order.ticker.clone())
                    .and_modify(|p| p.add_shares(order.quantity, fill_price))
                    .or_insert_with(|| {
                        SimulatedPosition::new(&order.ticker, order.quantity, fill_price)
                    });
            }
            OrderSide::Sell => {
                self.cash += notional;
                // Validation guaranteed the position exists and is big enough.
                if let Some(position) = self.positions.get_mut(&order.ticker) {
                    let pnl = (fill_price - position.avg_cost) * order.quantity as f64;
                    self.realized_pnl += pnl;
                    if pnl > 0.0 {
                        self.winning_trades += 1;
                    } else {
                        self.losing_trades += 1;
                    }
                    position.quantity -= order.quantity;
                    if position.quantity == 0 {
                        self.positions.remove(&order.ticker);
                    }
                }
            }
        }

        order.status = OrderStatus::Filled;
        order.filled_quantity = order.quantity;
        order.filled_price = Some(fill_price);
        order.filled_at = Some(self.clock.now());
        self.total_trades += 1;

        tracing::debug!(
            ticker = order.ticker,
            side = %order.side,
            quantity = order.quantity,
            fill_price,
            "Order filled"
        );
    }

    /// Fill any pending limit orders for this ticker that the new price
    /// satisfies (buy: price at or under limit; sell: price at or over).
    fn check_pending_limits(&mut self, ticker: &str, price: f64) {
        let candidates: Vec<String> = self
            .pending_limits
            .iter()
            .filter(|id| {
                self.orders
                    .get(*id)
                    .is_some_and(|o| o.ticker == ticker && o.status == OrderStatus::Pending)
            })
            .cloned()
            .collect();

        for id in candidates {
            let Some(order) = self.orders.get(&id) else {
                continue;
            };
            let Some(limit) = order.limit_price else {
                continue;
            };
            let triggered = match order.side {
                OrderSide::Buy => price <= limit,
                OrderSide::Sell => price >= limit,
            };
            if !triggered {
                continue;
            }

            // Re-validate against current cash/holdings before filling.
            let mut order = self.orders.remove(&id).unwrap();
            match self.validate(&order) {
                Ok(market_price) => self.fill(&mut order, market_price),
                Err(reason) => {
                    tracing::debug!(id, reason, "Pending limit order rejected at trigger");
                    order = order.reject(reason);
                }
            }
            self.orders.insert(id.clone(), order);
            self.pending_limits.retain(|p| p != &id);
        }
    }

    fn portfolio_value(&self) -> f64 {
        self.cash + self.positions.values().map(|p| p.market_value()).sum::<f64>()
    }

    fn update_drawdown(&mut self) {
        let value = self.portfolio_value();
        if value > self.peak_value {
            self.peak_value = value;
        } else if self.peak_value > 0.0 {
            let drawdown = (self.peak_value - value) / self.peak_value * 100.0;
            if drawdown > self.max_drawdown_pct {
                self.max_drawdown_pct = drawdown;
            }
        }
    }

    pub fn get_portfolio_stats(&self) -> PortfolioStats {
        let positions_value: f64 = self.positions.values().map(|p| p.market_value()).sum();
        let total_value = self.cash + positions_value;
        let closed = self.winning_trades + self.losing_trades;
        PortfolioStats {
            starting_cash: self.starting_cash,
            cash: self.cash,
            positions_value,
            total_value,
            total_return: total_value - self.starting_cash,
            total_return_pct: (total_value - self.starting_cash) / self.starting_cash * 100.0,
            total_trades: self.total_trades,
            winning_trades: self.winning_trades,
            losing_trades: self.losing_trades,
            win_rate: if closed > 0 {
                self.winning_trades as f64 / closed as f64 * 100.0
            } else {
                0.0
            },
            realized_pnl: self.realized_pnl,
            max_drawdown_pct: self.max_drawdown_pct,
        }
    }
}
