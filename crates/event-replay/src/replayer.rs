//! The dispatch loop: bridges virtual time and event delivery.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sim_clock::SharedClock;

use crate::events::{EventType, SimulationEvent};
use crate::queue::EventQueue;

/// A registered event handler. Errors are caught, logged, and counted; they
/// never abort the dispatch loop or suppress later handlers.
pub type Handler = Box<dyn FnMut(&SimulationEvent) -> anyhow::Result<()>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStats {
    pub dispatched: u64,
    pub handler_errors: u64,
}

/// Pops events in chronological order, sleeping on the session clock until
/// each event's virtual timestamp is reached.
pub struct Replayer {
    clock: SharedClock,
    queue: EventQueue,
    handlers: HashMap<EventType, Vec<Handler>>,
    stats: ReplayStats,
}

impl Replayer {
    pub fn new(clock: SharedClock, queue: EventQueue) -> Self {
        Self {
            clock,
            queue,
            handlers: HashMap::new(),
            stats: ReplayStats::default(),
        }
    }

    pub fn queue_mut(&mut self) -> &mut EventQueue {
        &mut self.queue
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    /// Register a handler for one event type. Handlers for a type run in
    /// registration order.
    pub fn register_handler<F>(&mut self, event_type: EventType, handler: F)
    where
        F: FnMut(&SimulationEvent) -> anyhow::Result<()> + 'static,
    {
        self.handlers
            .entry(event_type)
            .or_default()
            .push(Box::new(handler));
    }

    /// Dispatch one event to its handlers. Returns how many handlers failed.
    fn dispatch(&mut self, event: &SimulationEvent) -> u64 {
        let mut errors = 0;
        if let Some(handlers) = self.handlers.get_mut(&event.event_type) {
            for handler in handlers.iter_mut() {
                if let Err(err) = handler(event) {
                    tracing::warn!(
                        event_type = %event.event_type,
                        timestamp = %event.timestamp,
                        %err,
                        "Event handler failed"
                    );
                    errors += 1;
                }
            }
        }
        self.stats.dispatched += 1;
        self.stats.handler_errors += errors;
        errors
    }

    /// Process the next queued event.
    ///
    /// This is the sole synchronization point between virtual time and event
    /// delivery: if the head event is still in the future, the clock sleeps
    /// forward to it first, so no event is ever dispatched before its virtual
    /// timestamp. Returns the dispatched event plus its handler failure
    /// count, or `None` when the queue is empty or the clock clamped at
    /// `end_time` before reaching the event.
    pub fn process_next_event(&mut self) -> Option<(SimulationEvent, u64)> {
        let target = self.queue.peek()?.timestamp;

        while self.clock.now() < target {
            if self.clock.is_past_end() {
                // End-time clamp stopped us short; the event stays queued.
                return None;
            }
            let remaining = target - self.clock.now();
            let delta = remaining.num_microseconds().unwrap_or(i64::MAX) as f64 / 1e6;
            self.clock.sleep(delta.max(1e-6));
        }

        let event = self.queue.pop()?;
        let errors = self.dispatch(&event);
        Some((event, errors))
    }

    /// Drain and dispatch everything with `timestamp <= until` without
    /// sleeping. Catch-up path for batch processing and time jumps.
    pub fn process_events_until(&mut self, until: DateTime<Utc>) -> usize {
        let events = self.queue.pop_until(until);
        let count = events.len();
        for event in &events {
            self.dispatch(event);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use sim_clock::SimClock;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap()
    }

    fn instant_clock() -> SharedClock {
        SimClock::new(base(), Some(base() + Duration::hours(8)), 0.0)
            .unwrap()
            .shared()
    }

    fn custom_event(offset_secs: i64, tag: &str) -> SimulationEvent {
        SimulationEvent {
            timestamp: base() + Duration::seconds(offset_secs),
            priority: 1,
            event_type: EventType::Custom,
            payload: json!({ "tag": tag }),
        }
    }

    #[test]
    fn dispatch_advances_clock_to_event_time() {
        let clock = instant_clock();
        let mut replayer = Replayer::new(clock.clone(), EventQueue::new());
        replayer.queue_mut().push(custom_event(300, "later"));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        replayer.register_handler(EventType::Custom, move |e| {
            sink.borrow_mut().push(e.payload["tag"].as_str().unwrap().to_string());
            Ok(())
        });

        let (event, errors) = replayer.process_next_event().unwrap();
        assert_eq!(errors, 0);
        assert_eq!(event.timestamp, base() + Duration::seconds(300));
        assert!(clock.now() >= event.timestamp, "clock must reach the event");
        assert_eq!(seen.borrow().as_slice(), ["later"]);
    }

    #[test]
    fn handler_error_does_not_stop_remaining_handlers() {
        let mut replayer = Replayer::new(instant_clock(), EventQueue::new());
        replayer.queue_mut().push(custom_event(1, "x"));

        let calls = Rc::new(RefCell::new(0));
        replayer.register_handler(EventType::Custom, |_| {
            anyhow::bail!("boom")
        });
        let counter = calls.clone();
        replayer.register_handler(EventType::Custom, move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let (_, errors) = replayer.process_next_event().unwrap();
        assert_eq!(errors, 1);
        assert_eq!(*calls.borrow(), 1, "second handler still runs");
        assert_eq!(replayer.stats().handler_errors, 1);
        assert_eq!(replayer.stats().dispatched, 1);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut replayer = Replayer::new(instant_clock(), EventQueue::new());
        replayer.queue_mut().push(custom_event(1, "x"));

        let order = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let sink = order.clone();
            replayer.register_handler(EventType::Custom, move |_| {
                sink.borrow_mut().push(name);
                Ok(())
            });
        }
        replayer.process_next_event().unwrap();
        assert_eq!(order.borrow().as_slice(), ["a", "b", "c"]);
    }

    #[test]
    fn process_events_until_drains_without_sleeping() {
        let clock = instant_clock();
        let mut replayer = Replayer::new(clock.clone(), EventQueue::new());
        for offset in [10, 20, 30, 400] {
            replayer.queue_mut().push(custom_event(offset, "e"));
        }

        let processed = replayer.process_events_until(base() + Duration::seconds(30));
        assert_eq!(processed, 3);
        assert_eq!(replayer.pending_events(), 1);
        // Catch-up must not move the clock.
        assert_eq!(clock.now(), base());
    }

    #[test]
    fn event_past_end_time_is_not_dispatched() {
        let clock = SimClock::new(base(), Some(base() + Duration::seconds(60)), 0.0)
            .unwrap()
            .shared();
        let mut replayer = Replayer::new(clock, EventQueue::new());
        replayer.queue_mut().push(custom_event(120, "beyond"));

        assert!(replayer.process_next_event().is_none());
        assert_eq!(replayer.pending_events(), 1, "event stays queued");
        assert_eq!(replayer.stats().dispatched, 0);
    }

    #[test]
    fn empty_queue_returns_none() {
        let mut replayer = Replayer::new(instant_clock(), EventQueue::new());
        assert!(replayer.process_next_event().is_none());
    }
}
