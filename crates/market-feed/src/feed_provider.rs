use std::collections::HashSet;

use chrono::{DateTime, Utc};

use replay_core::{NewsItem, ParsedDay, SecFiling};
use sim_clock::SharedClock;

/// Chronological, deduplicated delivery of the day's news and filings.
///
/// Two monotone pointers advance past everything with `timestamp <= now`;
/// per-instance seen-id sets guard against double delivery when a caller
/// polls more than once within the same tick. State is per provider, never
/// global, so concurrent-run contamination is impossible.
pub struct FeedProvider {
    clock: SharedClock,
    news: Vec<NewsItem>,
    filings: Vec<SecFiling>,
    news_idx: usize,
    filing_idx: usize,
    seen_news: HashSet<String>,
    seen_filings: HashSet<String>,
}

fn filing_key(filing: &SecFiling) -> String {
    // Filings carry no vendor id on the wire.
    format!(
        "{}|{}|{}",
        filing.ticker,
        filing.form_type,
        filing.timestamp.timestamp()
    )
}

impl FeedProvider {
    pub fn new(clock: SharedClock, day: &ParsedDay) -> Self {
        Self {
            clock,
            news: day.news.clone(),
            filings: day.filings.clone(),
            news_idx: 0,
            filing_idx: 0,
            seen_news: HashSet::new(),
            seen_filings: HashSet::new(),
        }
    }

    /// News that became visible since the last call. Never returns the same
    /// item twice.
    pub fn get_new_items(&mut self) -> Vec<NewsItem> {
        let now = self.clock.now();
        let mut fresh = Vec::new();
        while self.news_idx < self.news.len() && self.news[self.news_idx].timestamp <= now {
            let item = &self.news[self.news_idx];
            if self.seen_news.insert(item.id.clone()) {
                fresh.push(item.clone());
            }
            self.news_idx += 1;
        }
        fresh
    }

    /// Filings that became visible since the last call.
    pub fn get_new_filings(&mut self) -> Vec<SecFiling> {
        let now = self.clock.now();
        let mut fresh = Vec::new();
        while self.filing_idx < self.filings.len()
            && self.filings[self.filing_idx].timestamp <= now
        {
            let filing = &self.filings[self.filing_idx];
            if self.seen_filings.insert(filing_key(filing)) {
                fresh.push(filing.clone());
            }
            self.filing_idx += 1;
        }
        fresh
    }

    /// Timestamp of the next unconsumed news item or filing, whichever comes
    /// first. Lets a scheduler skip idle stretches of the day.
    pub fn peek_next_item_time(&self) -> Option<DateTime<Utc>> {
        let next_news = self.news.get(self.news_idx).map(|n| n.timestamp);
        let next_filing = self.filings.get(self.filing_idx).map(|f| f.timestamp);
        match (next_news, next_filing) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn remaining(&self) -> usize {
        (self.news.len() - self.news_idx) + (self.filings.len() - self.filing_idx)
    }
}
