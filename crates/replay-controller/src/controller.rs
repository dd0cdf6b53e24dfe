use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use uuid::Uuid;

use event_replay::{
    load_package, push_market_session, EventQueue, EventType, Replayer, SimulationEvent,
};
use market_feed::{FeedProvider, MarketDataFeed};
use replay_core::{
    ConfigError, FileCacheFetcher, HistoricalDataFetcher, NewsItem, RunConfig, SecFiling,
    SetupError, SkippedRecords,
};
use sim_broker::{OrderSide, OrderType, SimulatedBroker};
use sim_clock::{clear_ambient_clock, set_ambient_clock, ClockStatus, SharedClock, SimClock};

use crate::observer::{ReplayObserver, TracingObserver};
use crate::result::{PositionSnapshot, RunResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Setup,
    Running,
    Paused,
    Stopped,
}

/// Orchestrates one replay session: builds the components, runs the dispatch
/// loop under an error budget, and aggregates the result.
pub struct SimulationController {
    config: RunConfig,
    state: ControllerState,
    run_id: String,
    observer: Rc<RefCell<dyn ReplayObserver>>,
    stop_flag: Rc<Cell<bool>>,
    clock: Option<SharedClock>,
    feed: Option<Rc<MarketDataFeed>>,
    provider: Option<Rc<RefCell<FeedProvider>>>,
    broker: Option<Rc<RefCell<SimulatedBroker>>>,
    replayer: Option<Replayer>,
    skipped: SkippedRecords,
    events_processed: u64,
    critical_errors: u32,
}

impl SimulationController {
    /// Config problems surface here, before any component exists.
    pub fn new(config: RunConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: ControllerState::Setup,
            run_id: Uuid::new_v4().to_string(),
            observer: Rc::new(RefCell::new(TracingObserver)),
            stop_flag: Rc::new(Cell::new(false)),
            clock: None,
            feed: None,
            provider: None,
            broker: None,
            replayer: None,
            skipped: SkippedRecords::default(),
            events_processed: 0,
            critical_errors: 0,
        })
    }

    pub fn with_observer(mut self, observer: Rc<RefCell<dyn ReplayObserver>>) -> Self {
        self.observer = observer;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Pre-flight checks for dry-run mode: config self-consistency and
    /// writable working directories. Never starts the loop.
    pub fn validate(&self) -> Result<(), SetupError> {
        self.config.validate()?;
        check_writable(&self.config.cache_dir)?;
        check_writable(&self.config.log_dir)?;
        Ok(())
    }

    /// Fetch the day package and build the session: clock, feeds, broker,
    /// replayer, default handlers.
    pub fn setup(&mut self, fetcher: &dyn HistoricalDataFetcher) -> Result<(), SetupError> {
        self.validate()?;

        let cached = FileCacheFetcher::new(
            fetcher,
            self.config.cache_dir.clone(),
            self.config.use_cache,
        );
        let package = cached
            .fetch_day(self.config.date)
            .map_err(|err| SetupError::DataFetch(err.to_string()))?;
        let day = package.parse();
        if day.is_empty() {
            return Err(SetupError::EmptyPackage(self.config.date.to_string()));
        }
        self.skipped = day.skipped;

        let (session_start, session_end) = self.config.session_bounds();
        let clock = SimClock::new(
            session_start,
            Some(session_end),
            self.config.speed_multiplier,
        )?
        .shared();
        set_ambient_clock(clock.clone());

        let feed = Rc::new(MarketDataFeed::new(clock.clone(), &day));
        let provider = Rc::new(RefCell::new(FeedProvider::new(clock.clone(), &day)));
        let broker = Rc::new(RefCell::new(SimulatedBroker::new(
            clock.clone(),
            self.config.starting_cash,
            self.config.slippage,
            self.config.max_volume_pct,
        )));
        for ticker in feed.tickers() {
            if let Some(volume) = feed.daily_volume(ticker) {
                broker.borrow_mut().seed_daily_volume(ticker, volume);
            }
        }

        let mut queue = EventQueue::new();
        load_package(&mut queue, &day);
        push_market_session(&mut queue, session_start, session_end);

        let mut replayer = Replayer::new(clock.clone(), queue);
        self.register_default_handlers(&mut replayer, &broker);

        tracing::info!(
            run_id = self.run_id,
            date = %self.config.date,
            speed = self.config.speed_multiplier,
            events = replayer.pending_events(),
            "Session ready"
        );

        self.clock = Some(clock);
        self.feed = Some(feed);
        self.provider = Some(provider);
        self.broker = Some(broker);
        self.replayer = Some(replayer);
        Ok(())
    }

    fn register_default_handlers(
        &self,
        replayer: &mut Replayer,
        broker: &Rc<RefCell<SimulatedBroker>>,
    ) {
        let price_broker = broker.clone();
        replayer.register_handler(EventType::PriceUpdate, move |event| {
            let ticker = event
                .ticker()
                .ok_or_else(|| anyhow::anyhow!("price update without ticker"))?;
            let price = event
                .payload
                .get("price")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| anyhow::anyhow!("price update without price"))?;
            let volume = event
                .payload
                .get("volume")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            price_broker.borrow_mut().update_price(ticker, price, volume);
            Ok(())
        });

        let news_observer = self.observer.clone();
        replayer.register_handler(EventType::NewsItem, move |event| {
            let item: NewsItem = serde_json::from_value(event.payload.clone())?;
            news_observer.borrow_mut().on_news(&item);
            Ok(())
        });

        let filing_observer = self.observer.clone();
        replayer.register_handler(EventType::SecFiling, move |event| {
            let filing: SecFiling = serde_json::from_value(event.payload.clone())?;
            filing_observer.borrow_mut().on_filing(&filing);
            Ok(())
        });

        for phase in [EventType::MarketOpen, EventType::MarketClose] {
            let phase_observer = self.observer.clone();
            replayer.register_handler(phase, move |event| {
                phase_observer
                    .borrow_mut()
                    .on_market_phase(event.event_type, event.timestamp);
                Ok(())
            });
        }
    }

    /// Register a strategy-layer handler. Must be called after `setup`.
    pub fn register_handler<F>(&mut self, event_type: EventType, handler: F)
    where
        F: FnMut(&SimulationEvent) -> anyhow::Result<()> + 'static,
    {
        if let Some(replayer) = self.replayer.as_mut() {
            replayer.register_handler(event_type, handler);
        }
    }

    /// Run the dispatch loop to completion: queue drained, clock past the
    /// session end, stop requested, or error budget exhausted. Always
    /// produces a result.
    pub fn run(&mut self) -> RunResult {
        self.state = ControllerState::Running;

        while let Some(replayer) = self.replayer.as_mut() {
            if self.stop_flag.get() {
                tracing::info!(run_id = self.run_id, "Stop requested");
                break;
            }
            if self.critical_errors >= self.config.max_critical_errors {
                tracing::error!(
                    run_id = self.run_id,
                    critical_errors = self.critical_errors,
                    "Error budget exhausted, terminating run early"
                );
                break;
            }
            match replayer.process_next_event() {
                Some((_, handler_errors)) => {
                    self.events_processed += 1;
                    self.critical_errors += handler_errors as u32;
                }
                // Queue empty or clock clamped at the session end.
                None => break,
            }
        }

        self.state = ControllerState::Stopped;
        let result = self.build_result();
        tracing::info!(
            run_id = self.run_id,
            events = result.events_processed,
            errors = result.critical_errors,
            return_pct = result.portfolio.total_return_pct,
            "Run finished"
        );
        result
    }

    fn build_result(&self) -> RunResult {
        let (portfolio, positions, orders_count) = match self.broker.as_ref() {
            Some(broker) => {
                let broker = broker.borrow();
                let positions: HashMap<String, PositionSnapshot> = broker
                    .positions()
                    .iter()
                    .map(|(ticker, p)| {
                        (
                            ticker.clone(),
                            PositionSnapshot {
                                quantity: p.quantity,
                                avg_cost: p.avg_cost,
                                current_price: p.current_price,
                                unrealized_pnl: p.unrealized_pnl(),
                            },
                        )
                    })
                    .collect();
                (broker.get_portfolio_stats(), positions, broker.orders_count())
            }
            None => (Default::default(), HashMap::new(), 0),
        };

        RunResult {
            run_id: self.run_id.clone(),
            events_processed: self.events_processed,
            critical_errors: self.critical_errors,
            skipped_records: self.skipped,
            portfolio,
            positions,
            orders_count,
            artifacts: self.observer.borrow().artifacts(),
        }
    }

    // Mid-run controls: thin pass-throughs to the clock, callable from
    // strategy handlers.

    pub fn pause(&mut self) {
        if let Some(clock) = &self.clock {
            clock.pause();
            if self.state == ControllerState::Running {
                self.state = ControllerState::Paused;
            }
        }
    }

    pub fn resume(&mut self) {
        if let Some(clock) = &self.clock {
            clock.resume();
            if self.state == ControllerState::Paused {
                self.state = ControllerState::Running;
            }
        }
    }

    pub fn set_speed(&mut self, multiplier: f64) -> Result<(), ConfigError> {
        if let Some(clock) = &self.clock {
            clock.set_speed(multiplier)?;
        }
        Ok(())
    }

    pub fn jump_to_time(&mut self, hour: u32, min: u32, sec: u32) -> Result<(), ConfigError> {
        if let Some(clock) = &self.clock {
            clock.jump_to_time_of_day(hour, min, sec)?;
        }
        Ok(())
    }

    /// Cooperative cancellation: handlers can trip this flag; the loop
    /// checks it once per iteration, so the in-flight event completes.
    pub fn stop_handle(&self) -> Rc<Cell<bool>> {
        self.stop_flag.clone()
    }

    pub fn stop(&self) {
        self.stop_flag.set(true);
    }

    pub fn clock_status(&self) -> Option<ClockStatus> {
        self.clock.as_ref().map(|c| c.status())
    }

    pub fn broker(&self) -> Option<Rc<RefCell<SimulatedBroker>>> {
        self.broker.clone()
    }

    pub fn feed(&self) -> Option<Rc<MarketDataFeed>> {
        self.feed.clone()
    }

    pub fn provider(&self) -> Option<Rc<RefCell<FeedProvider>>> {
        self.provider.clone()
    }

    /// Deregister this run's instances so the next run starts clean.
    pub fn cleanup(&mut self) {
        clear_ambient_clock();
        self.replayer = None;
        self.broker = None;
        self.provider = None;
        self.feed = None;
        self.clock = None;
        self.state = ControllerState::Stopped;
    }
}

/// Convenience for strategies: submit a market order through the shared
/// broker handle.
pub fn submit_market_order(
    broker: &Rc<RefCell<SimulatedBroker>>,
    ticker: &str,
    side: OrderSide,
    quantity: u64,
) -> sim_broker::SimulatedOrder {
    broker
        .borrow_mut()
        .submit_order(ticker, side, quantity, OrderType::Market, None)
}

fn check_writable(dir: &Path) -> Result<(), SetupError> {
    let unwritable = |source| SetupError::UnwritableDir {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(unwritable)?;
    let probe = dir.join(".write-probe");
    fs::write(&probe, b"ok").map_err(unwritable)?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use replay_core::{
        DataPackage, RawBar, RawFiling, RawNewsItem, SlippageConfig, SlippageModel, TimeWindow,
    };
    use sim_clock::ambient_clock;

    struct StaticFetcher {
        package: DataPackage,
    }

    impl HistoricalDataFetcher for StaticFetcher {
        fn fetch_day(&self, _date: NaiveDate) -> anyhow::Result<DataPackage> {
            Ok(self.package.clone())
        }
    }

    struct FailingFetcher;

    impl HistoricalDataFetcher for FailingFetcher {
        fn fetch_day(&self, date: NaiveDate) -> anyhow::Result<DataPackage> {
            anyhow::bail!("vendor unavailable for {date}")
        }
    }

    /// Recording observer for asserting delivery.
    #[derive(Default)]
    struct RecordingObserver {
        news: Vec<String>,
        filings: Vec<String>,
        phases: Vec<EventType>,
    }

    impl ReplayObserver for RecordingObserver {
        fn on_news(&mut self, item: &NewsItem) {
            self.news.push(item.id.clone());
        }
        fn on_filing(&mut self, filing: &SecFiling) {
            self.filings.push(filing.form_type.clone());
        }
        fn on_market_phase(&mut self, phase: EventType, _at: chrono::DateTime<chrono::Utc>) {
            self.phases.push(phase);
        }
    }

    fn bar(ts: &str, open: f64, close: f64, volume: u64) -> RawBar {
        RawBar {
            timestamp: ts.to_string(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
        }
    }

    fn sample_package() -> DataPackage {
        let mut package = DataPackage {
            date: Some(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()),
            ..DataPackage::default()
        };
        package.price_bars.insert(
            "AAPL".to_string(),
            vec![
                bar("2024-03-04T10:00:00Z", 150.0, 150.0, 400_000),
                bar("2024-03-04T11:00:00Z", 150.0, 155.0, 300_000),
                bar("2024-03-04T12:00:00Z", 155.0, 160.0, 300_000),
            ],
        );
        package.news_items.push(RawNewsItem {
            id: "news-1".to_string(),
            timestamp: "2024-03-04T10:30:00Z".to_string(),
            title: "Upgrade".to_string(),
            summary: String::new(),
            source: "wire".to_string(),
            url: String::new(),
            related_tickers: vec!["AAPL".to_string()],
        });
        package.sec_filings.push(RawFiling {
            ticker: "AAPL".to_string(),
            timestamp: "2024-03-04T11:30:00Z".to_string(),
            form_type: "8-K".to_string(),
            extra: serde_json::Value::Null,
        });
        package
    }

    fn test_config(dir: &Path) -> RunConfig {
        RunConfig {
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            window: TimeWindow::MarketHours,
            speed_multiplier: 0.0,
            starting_cash: 10_000.0,
            slippage: SlippageConfig {
                model: SlippageModel::None,
                ..SlippageConfig::default()
            },
            max_volume_pct: 0.05,
            max_critical_errors: 10,
            use_cache: false,
            cache_dir: dir.join("cache"),
            log_dir: dir.join("logs"),
        }
    }

    fn init_tracing() {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn full_day_replay_in_instant_mode() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let observer = Rc::new(RefCell::new(RecordingObserver::default()));

        let mut controller = SimulationController::new(test_config(dir.path()))
            .unwrap()
            .with_observer(observer.clone());
        controller
            .setup(&StaticFetcher {
                package: sample_package(),
            })
            .unwrap();
        let result = controller.run();

        // 3 bars + 1 news + 1 filing + open + close
        assert_eq!(result.events_processed, 7);
        assert_eq!(result.critical_errors, 0);
        assert_eq!(result.orders_count, 0);
        assert_eq!(controller.state(), ControllerState::Stopped);

        let observer = observer.borrow();
        assert_eq!(observer.news.as_slice(), ["news-1"]);
        assert_eq!(observer.filings.as_slice(), ["8-K"]);
        assert_eq!(
            observer.phases.as_slice(),
            [EventType::MarketOpen, EventType::MarketClose]
        );
    }

    #[test]
    fn strategy_handler_can_trade_through_the_broker() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = SimulationController::new(test_config(dir.path())).unwrap();
        controller
            .setup(&StaticFetcher {
                package: sample_package(),
            })
            .unwrap();

        // Buy 10 shares on the first price update, at $150
        let broker = controller.broker().unwrap();
        let bought = Rc::new(Cell::new(false));
        let flag = bought.clone();
        controller.register_handler(EventType::PriceUpdate, move |event| {
            if !flag.get() && event.ticker() == Some("AAPL") {
                let order = submit_market_order(&broker, "AAPL", OrderSide::Buy, 10);
                anyhow::ensure!(order.rejection_reason.is_none(), "unexpected rejection");
                flag.set(true);
            }
            Ok(())
        });

        let result = controller.run();
        assert_eq!(result.orders_count, 1);

        let position = &result.positions["AAPL"];
        assert_eq!(position.quantity, 10);
        assert!((position.avg_cost - 150.0).abs() < 1e-9);
        // Last bar closed at 160
        assert!((position.current_price - 160.0).abs() < 1e-9);
        assert!((position.unrealized_pnl - 100.0).abs() < 1e-9);
        assert!((result.portfolio.total_value - 10_100.0).abs() < 1e-9);
    }

    #[test]
    fn error_budget_terminates_run_early_with_partial_result() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            max_critical_errors: 2,
            ..test_config(dir.path())
        };
        let mut controller = SimulationController::new(config).unwrap();
        controller
            .setup(&StaticFetcher {
                package: sample_package(),
            })
            .unwrap();
        controller.register_handler(EventType::PriceUpdate, |_| anyhow::bail!("strategy bug"));

        let result = controller.run();
        assert_eq!(result.critical_errors, 2);
        assert!(result.events_processed < 7, "run must stop early");
    }

    #[test]
    fn stop_flag_halts_the_loop_between_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = SimulationController::new(test_config(dir.path())).unwrap();
        controller
            .setup(&StaticFetcher {
                package: sample_package(),
            })
            .unwrap();

        let stop = controller.stop_handle();
        controller.register_handler(EventType::MarketOpen, move |_| {
            stop.set(true);
            Ok(())
        });

        let result = controller.run();
        assert_eq!(result.events_processed, 1, "only the open event runs");
    }

    #[test]
    fn fetch_failure_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = SimulationController::new(test_config(dir.path())).unwrap();
        let err = controller.setup(&FailingFetcher).unwrap_err();
        assert!(matches!(err, SetupError::DataFetch(_)));
        assert_eq!(controller.state(), ControllerState::Setup);
    }

    #[test]
    fn empty_package_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = SimulationController::new(test_config(dir.path())).unwrap();
        let err = controller
            .setup(&StaticFetcher {
                package: DataPackage::default(),
            })
            .unwrap_err();
        assert!(matches!(err, SetupError::EmptyPackage(_)));
    }

    #[test]
    fn negative_speed_never_constructs_a_controller() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            speed_multiplier: -4.0,
            ..test_config(dir.path())
        };
        assert!(matches!(
            SimulationController::new(config),
            Err(ConfigError::NegativeSpeed(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_directory_fails_validation() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let readonly = dir.path().join("readonly");
        fs::create_dir(&readonly).unwrap();
        fs::set_permissions(&readonly, fs::Permissions::from_mode(0o555)).unwrap();
        if fs::write(readonly.join("probe"), b"x").is_ok() {
            // Permission bits do not bind for root.
            return;
        }

        let config = RunConfig {
            cache_dir: readonly.join("cache"),
            ..test_config(dir.path())
        };
        let controller = SimulationController::new(config).unwrap();
        assert!(matches!(
            controller.validate(),
            Err(SetupError::UnwritableDir { .. })
        ));
    }

    #[test]
    fn cleanup_clears_the_ambient_clock() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = SimulationController::new(test_config(dir.path())).unwrap();
        controller
            .setup(&StaticFetcher {
                package: sample_package(),
            })
            .unwrap();
        assert!(ambient_clock().is_some());

        controller.run();
        controller.cleanup();
        assert!(ambient_clock().is_none());
        assert!(controller.broker().is_none());
    }

    #[test]
    fn skipped_records_are_reported_in_the_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut package = sample_package();
        package
            .price_bars
            .get_mut("AAPL")
            .unwrap()
            .push(bar("garbage-timestamp", 1.0, 1.0, 1));

        let mut controller = SimulationController::new(test_config(dir.path())).unwrap();
        controller.setup(&StaticFetcher { package }).unwrap();
        let result = controller.run();
        assert_eq!(result.skipped_records.price_bars, 1);
        assert_eq!(result.events_processed, 7);
    }
}
