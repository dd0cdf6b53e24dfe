use std::cell::RefCell;
use std::collections::HashMap;

use replay_core::{ParsedDay, PriceBar};
use sim_clock::SharedClock;

/// One ticker's bars: a timestamp-sorted arena searched by binary search.
struct TickerSeries {
    bars: Vec<PriceBar>,
    daily_volume: u64,
}

/// Last resolved bar per ticker, so repeated lookups between bar boundaries
/// are O(1).
#[derive(Clone, Copy)]
struct CacheEntry {
    index: usize,
}

/// Historical OHLCV lookup, always answered relative to `clock.now()`.
///
/// Tickers with no bar at or before the current time yield `None`; that is
/// "no price yet", not an error.
pub struct MarketDataFeed {
    clock: SharedClock,
    series: HashMap<String, TickerSeries>,
    cache: RefCell<HashMap<String, CacheEntry>>,
}

impl MarketDataFeed {
    pub fn new(clock: SharedClock, day: &ParsedDay) -> Self {
        let mut series = HashMap::new();
        for (ticker, bars) in &day.bars_by_ticker {
            // Bars arrive sorted from ParsedDay; daily volume is the whole
            // day's total, used for volume-cap validation.
            let daily_volume = bars.iter().map(|b| b.volume).sum();
            series.insert(
                ticker.clone(),
                TickerSeries {
                    bars: bars.clone(),
                    daily_volume,
                },
            );
        }
        tracing::debug!(tickers = series.len(), "Market data feed built");
        Self {
            clock,
            series,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn tickers(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    /// Total volume traded across the whole day for the ticker.
    pub fn daily_volume(&self, ticker: &str) -> Option<u64> {
        self.series.get(ticker).map(|s| s.daily_volume)
    }

    /// Index of the latest bar with `timestamp <= now`, cached between bar
    /// boundaries.
    fn current_index(&self, ticker: &str) -> Option<usize> {
        let now = self.clock.now();
        let series = self.series.get(ticker)?;
        let bars = &series.bars;

        if let Some(entry) = self.cache.borrow().get(ticker) {
            let i = entry.index;
            if i < bars.len()
                && bars[i].timestamp <= now
                && bars.get(i + 1).map_or(true, |next| next.timestamp > now)
            {
                return Some(i);
            }
        }

        let count = bars.partition_point(|b| b.timestamp <= now);
        if count == 0 {
            return None;
        }
        let index = count - 1;
        self.cache
            .borrow_mut()
            .insert(ticker.to_string(), CacheEntry { index });
        Some(index)
    }

    /// Latest known price (bar close) at or before the current virtual time.
    pub fn get_last_price(&self, ticker: &str) -> Option<f64> {
        let index = self.current_index(ticker)?;
        Some(self.series[ticker].bars[index].close)
    }

    /// Latest price plus the reference price for change-percent math: the
    /// previous bar's close, or the current bar's open when it is the first.
    pub fn get_last_price_snapshot(&self, ticker: &str) -> Option<(f64, f64)> {
        let index = self.current_index(ticker)?;
        let bars = &self.series[ticker].bars;
        let last = bars[index].close;
        let reference = if index > 0 {
            bars[index - 1].close
        } else {
            bars[index].open
        };
        Some((last, reference))
    }

    /// Price and change-percent for each requested ticker that has data.
    pub fn batch_get(&self, tickers: &[&str]) -> HashMap<String, (f64, f64)> {
        let mut out = HashMap::new();
        for ticker in tickers {
            if let Some((last, reference)) = self.get_last_price_snapshot(ticker) {
                let change_pct = if reference != 0.0 {
                    (last - reference) / reference * 100.0
                } else {
                    0.0
                };
                out.insert(ticker.to_string(), (last, change_pct));
            }
        }
        out
    }

    /// The bar the session clock currently sits on.
    pub fn current_bar(&self, ticker: &str) -> Option<&PriceBar> {
        let index = self.current_index(ticker)?;
        Some(&self.series[ticker].bars[index])
    }
}
