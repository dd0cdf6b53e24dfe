//! Converts a parsed day package into queued simulation events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replay_core::ParsedDay;

use crate::events::SimulationEvent;
use crate::queue::EventQueue;

/// Counts of events produced from one day package. Records with bad
/// timestamps were already dropped during parsing; their counts live on
/// `ParsedDay::skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub price_events: usize,
    pub news_events: usize,
    pub filing_events: usize,
}

impl LoadStats {
    pub fn total(&self) -> usize {
        self.price_events + self.news_events + self.filing_events
    }
}

/// Queue every bar, news item, and filing of the day as a typed event.
pub fn load_package(queue: &mut EventQueue, day: &ParsedDay) -> LoadStats {
    let mut stats = LoadStats::default();

    for bars in day.bars_by_ticker.values() {
        for bar in bars {
            queue.push(SimulationEvent::price_update(bar));
            stats.price_events += 1;
        }
    }
    for item in &day.news {
        queue.push(SimulationEvent::news(item));
        stats.news_events += 1;
    }
    for filing in &day.filings {
        queue.push(SimulationEvent::filing(filing));
        stats.filing_events += 1;
    }

    tracing::info!(
        price = stats.price_events,
        news = stats.news_events,
        filings = stats.filing_events,
        "Loaded day package into event queue"
    );
    stats
}

/// Queue the market session boundary events.
pub fn push_market_session(queue: &mut EventQueue, open_at: DateTime<Utc>, close_at: DateTime<Utc>) {
    queue.push(SimulationEvent::market_open(open_at));
    queue.push(SimulationEvent::market_close(close_at));
}
