//! Synthetic order-matching broker for replay sessions: validation,
//! slippage-adjusted fills, and position/portfolio accounting.

pub mod broker;
pub mod order;
pub mod portfolio;
pub mod slippage;

#[cfg(test)]
mod tests;

pub use broker::SimulatedBroker;
pub use order::{OrderSide, OrderStatus, OrderType, SimulatedOrder};
pub use portfolio::{PortfolioStats, SimulatedPosition};
pub use slippage::fill_slippage;
