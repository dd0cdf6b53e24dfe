//! Data contracts for a single historical trading day.
//!
//! The raw package keeps timestamps as strings so that records with
//! unparseable timestamps can be skipped and counted instead of failing the
//! whole day.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One day of historical data as delivered by a `HistoricalDataFetcher`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataPackage {
    /// Trading date, "YYYY-MM-DD".
    pub date: Option<NaiveDate>,
    /// Intraday OHLCV bars per ticker.
    #[serde(default)]
    pub price_bars: HashMap<String, Vec<RawBar>>,
    #[serde(default)]
    pub news_items: Vec<RawNewsItem>,
    #[serde(default)]
    pub sec_filings: Vec<RawFiling>,
}

/// An OHLCV bar as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNewsItem {
    pub id: String,
    pub timestamp: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub related_tickers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFiling {
    pub ticker: String,
    pub timestamp: String,
    pub form_type: String,
    /// Vendor-specific extras (accession number, filing URL, ...).
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// A price bar with a resolved timestamp. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub related_tickers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecFiling {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub form_type: String,
    pub extra: serde_json::Value,
}

/// Records dropped during parsing because their timestamps were unreadable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecords {
    pub price_bars: usize,
    pub news_items: usize,
    pub sec_filings: usize,
}

impl SkippedRecords {
    pub fn total(&self) -> usize {
        self.price_bars + self.news_items + self.sec_filings
    }
}

/// A fully parsed day: chronologically sorted, timestamp-resolved records.
#[derive(Debug, Clone, Default)]
pub struct ParsedDay {
    pub bars_by_ticker: HashMap<String, Vec<PriceBar>>,
    pub news: Vec<NewsItem>,
    pub filings: Vec<SecFiling>,
    pub skipped: SkippedRecords,
}

impl ParsedDay {
    pub fn is_empty(&self) -> bool {
        self.bars_by_ticker.values().all(|b| b.is_empty())
    }

    pub fn bar_count(&self) -> usize {
        self.bars_by_ticker.values().map(|b| b.len()).sum()
    }
}

/// Parse an ISO-8601-ish timestamp. Accepts RFC 3339 with an offset, or a
/// naive datetime assumed to be UTC. Returns `None` for anything else.
pub fn parse_event_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

impl DataPackage {
    /// Parse all raw records into domain types, sorting each stream
    /// chronologically. Unparseable timestamps are skipped and counted,
    /// never fatal.
    pub fn parse(&self) -> ParsedDay {
        let mut day = ParsedDay::default();

        for (ticker, raw_bars) in &self.price_bars {
            let mut bars: Vec<PriceBar> = Vec::with_capacity(raw_bars.len());
            for raw in raw_bars {
                match parse_event_timestamp(&raw.timestamp) {
                    Some(ts) => bars.push(PriceBar {
                        ticker: ticker.clone(),
                        timestamp: ts,
                        open: raw.open,
                        high: raw.high,
                        low: raw.low,
                        close: raw.close,
                        volume: raw.volume,
                    }),
                    None => day.skipped.price_bars += 1,
                }
            }
            bars.sort_by_key(|b| b.timestamp);
            day.bars_by_ticker.insert(ticker.clone(), bars);
        }

        for raw in &self.news_items {
            match parse_event_timestamp(&raw.timestamp) {
                Some(ts) => day.news.push(NewsItem {
                    id: raw.id.clone(),
                    timestamp: ts,
                    title: raw.title.clone(),
                    summary: raw.summary.clone(),
                    source: raw.source.clone(),
                    url: raw.url.clone(),
                    related_tickers: raw.related_tickers.clone(),
                }),
                None => day.skipped.news_items += 1,
            }
        }
        day.news.sort_by_key(|n| n.timestamp);

        for raw in &self.sec_filings {
            match parse_event_timestamp(&raw.timestamp) {
                Some(ts) => day.filings.push(SecFiling {
                    ticker: raw.ticker.clone(),
                    timestamp: ts,
                    form_type: raw.form_type.clone(),
                    extra: raw.extra.clone(),
                }),
                None => day.skipped.sec_filings += 1,
            }
        }
        day.filings.sort_by_key(|f| f.timestamp);

        if day.skipped.total() > 0 {
            tracing::warn!(
                skipped = day.skipped.total(),
                "Skipped records with unparseable timestamps"
            );
        }

        day
    }
}
