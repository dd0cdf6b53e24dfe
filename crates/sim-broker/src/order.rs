use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Filled,
    /// Present in the lifecycle; the simplified fill model always executes
    /// the whole quantity, so it is never produced today.
    Partial,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    /// Terminal orders are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }
}

/// An order in the synthetic broker. Rejections come back as a status plus a
/// human-readable reason, never as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedOrder {
    pub id: String,
    pub ticker: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
    pub status: OrderStatus,
    pub filled_quantity: u64,
    pub filled_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl SimulatedOrder {
    pub fn new(
        ticker: &str,
        side: OrderSide,
        quantity: u64,
        order_type: OrderType,
        limit_price: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            side,
            quantity,
            order_type,
            limit_price,
            status: OrderStatus::Pending,
            filled_quantity: 0,
            filled_price: None,
            created_at,
            filled_at: None,
            rejection_reason: None,
        }
    }

    pub fn reject(mut self, reason: String) -> Self {
        self.status = OrderStatus::Rejected;
        self.rejection_reason = Some(reason);
        self
    }
}
