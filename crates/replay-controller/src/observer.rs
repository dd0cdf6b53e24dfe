use std::path::PathBuf;

use chrono::{DateTime, Utc};

use event_replay::EventType;
use replay_core::{NewsItem, SecFiling};

/// External logging/delivery collaborator boundary. Chart rendering and
/// Discord delivery live behind this seam, outside the core.
pub trait ReplayObserver {
    fn on_news(&mut self, _item: &NewsItem) {}
    fn on_filing(&mut self, _filing: &SecFiling) {}
    fn on_market_phase(&mut self, _phase: EventType, _at: DateTime<Utc>) {}

    /// Paths to any log artifacts this observer produced during the run.
    fn artifacts(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Default observer: forwards everything to the tracing subscriber.
#[derive(Default)]
pub struct TracingObserver;

impl ReplayObserver for TracingObserver {
    fn on_news(&mut self, item: &NewsItem) {
        tracing::info!(
            id = item.id,
            source = item.source,
            tickers = ?item.related_tickers,
            "News: {}",
            item.title
        );
    }

    fn on_filing(&mut self, filing: &SecFiling) {
        tracing::info!(ticker = filing.ticker, form = filing.form_type, "SEC filing");
    }

    fn on_market_phase(&mut self, phase: EventType, at: DateTime<Utc>) {
        tracing::info!(%phase, %at, "Market phase change");
    }
}
