//! Time-indexed historical data feeds: OHLCV lookup keyed by the session
//! clock, and chronological news/filing delivery.

pub mod feed_provider;
pub mod price_feed;

pub use feed_provider::FeedProvider;
pub use price_feed::MarketDataFeed;
