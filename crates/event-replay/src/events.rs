use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use replay_core::{NewsItem, PriceBar, SecFiling};

/// Kinds of events a session can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PriceUpdate,
    NewsItem,
    SecFiling,
    MarketOpen,
    MarketClose,
    Custom,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventType::PriceUpdate => "PRICE_UPDATE",
            EventType::NewsItem => "NEWS_ITEM",
            EventType::SecFiling => "SEC_FILING",
            EventType::MarketOpen => "MARKET_OPEN",
            EventType::MarketClose => "MARKET_CLOSE",
            EventType::Custom => "CUSTOM",
        };
        write!(f, "{name}")
    }
}

// Default dispatch priorities (lower = more urgent). Market phase changes go
// first at a shared timestamp, then prices, then news, then filings.
pub const PRIORITY_MARKET_PHASE: i32 = 0;
pub const PRIORITY_PRICE: i32 = 1;
pub const PRIORITY_NEWS: i32 = 2;
pub const PRIORITY_FILING: i32 = 3;

/// One timestamped event in the replay. Ordering key is
/// `(timestamp, priority)`; payload shape depends on the event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub timestamp: DateTime<Utc>,
    pub priority: i32,
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

impl SimulationEvent {
    pub fn price_update(bar: &PriceBar) -> Self {
        Self {
            timestamp: bar.timestamp,
            priority: PRIORITY_PRICE,
            event_type: EventType::PriceUpdate,
            payload: json!({
                "ticker": bar.ticker,
                "price": bar.close,
                "open": bar.open,
                "high": bar.high,
                "low": bar.low,
                "close": bar.close,
                "volume": bar.volume,
            }),
        }
    }

    pub fn news(item: &NewsItem) -> Self {
        Self {
            timestamp: item.timestamp,
            priority: PRIORITY_NEWS,
            event_type: EventType::NewsItem,
            payload: serde_json::to_value(item).unwrap_or_default(),
        }
    }

    pub fn filing(filing: &SecFiling) -> Self {
        Self {
            timestamp: filing.timestamp,
            priority: PRIORITY_FILING,
            event_type: EventType::SecFiling,
            payload: serde_json::to_value(filing).unwrap_or_default(),
        }
    }

    pub fn market_open(at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            priority: PRIORITY_MARKET_PHASE,
            event_type: EventType::MarketOpen,
            payload: serde_json::Value::Null,
        }
    }

    pub fn market_close(at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            priority: PRIORITY_MARKET_PHASE,
            event_type: EventType::MarketClose,
            payload: serde_json::Value::Null,
        }
    }

    pub fn custom(at: DateTime<Utc>, name: &str, payload: serde_json::Value) -> Self {
        Self {
            timestamp: at,
            priority: PRIORITY_NEWS,
            event_type: EventType::Custom,
            payload: json!({ "event_name": name, "data": payload }),
        }
    }

    /// Ticker carried in the payload, if the event has one.
    pub fn ticker(&self) -> Option<&str> {
        self.payload.get("ticker").and_then(|v| v.as_str())
    }
}
