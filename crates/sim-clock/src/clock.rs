use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use replay_core::ConfigError;

/// How often a blocking [`SimClock::sleep`] re-checks the pause flag and the
/// remaining distance to its target.
const SLEEP_POLL: StdDuration = StdDuration::from_millis(10);

/// Shared handle to a session's clock. The core is single-threaded, so a
/// plain `Rc` is enough; interior mutability lets every holder read and
/// steer time through `&self`.
pub type SharedClock = Rc<SimClock>;

/// Snapshot of the clock for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockStatus {
    pub current_time: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub speed_multiplier: f64,
    pub paused: bool,
    /// Virtual seconds elapsed since the session start.
    pub virtual_elapsed_secs: f64,
}

struct ClockState {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    /// 0 = instant, 1 = real-time, N = N-times accelerated.
    speed: f64,
    /// Virtual time at the moment `real_anchor` was taken. In instant mode
    /// this *is* the current time and advances only through `sleep`.
    virtual_anchor: DateTime<Utc>,
    real_anchor: Instant,
    paused: bool,
    pause_started: Option<Instant>,
    paused_total: StdDuration,
    /// Monotonicity watermark: `now()` never reports earlier than this
    /// within one anchor epoch. Jumps reset it to the jump target.
    last_reported: DateTime<Utc>,
}

impl ClockState {
    fn raw_now(&self) -> DateTime<Utc> {
        if self.speed == 0.0 {
            return self.virtual_anchor;
        }
        let reference = match (self.paused, self.pause_started) {
            (true, Some(at)) => at,
            _ => Instant::now(),
        };
        let active = reference
            .saturating_duration_since(self.real_anchor)
            .checked_sub(self.paused_total)
            .unwrap_or_default();
        self.virtual_anchor + scaled(active, self.speed)
    }

    fn reanchor(&mut self, at: DateTime<Utc>) {
        self.virtual_anchor = at;
        self.real_anchor = Instant::now();
        self.paused_total = StdDuration::ZERO;
        if self.paused {
            self.pause_started = Some(Instant::now());
        }
    }
}

fn scaled(active: StdDuration, speed: f64) -> Duration {
    Duration::from_std(active.mul_f64(speed)).unwrap_or_else(|_| Duration::days(36_500))
}

/// Virtual time source for one replay session.
///
/// All methods take `&self`; state lives behind a `RefCell` so the clock can
/// be shared freely within the single-threaded core.
pub struct SimClock {
    inner: RefCell<ClockState>,
}

impl SimClock {
    /// A negative speed multiplier is a configuration error, caught here
    /// rather than at the first `now()` call.
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        speed_multiplier: f64,
    ) -> Result<Self, ConfigError> {
        if speed_multiplier < 0.0 || speed_multiplier.is_nan() {
            return Err(ConfigError::NegativeSpeed(speed_multiplier));
        }
        if let Some(end) = end_time {
            if end <= start_time {
                return Err(ConfigError::InvalidWindow {
                    start: start_time.to_rfc3339(),
                    end: end.to_rfc3339(),
                });
            }
        }
        Ok(Self {
            inner: RefCell::new(ClockState {
                start_time,
                end_time,
                speed: speed_multiplier,
                virtual_anchor: start_time,
                real_anchor: Instant::now(),
                paused: false,
                pause_started: None,
                paused_total: StdDuration::ZERO,
                last_reported: start_time,
            }),
        })
    }

    pub fn shared(self) -> SharedClock {
        Rc::new(self)
    }

    /// Current virtual time. Monotonically non-decreasing within an anchor
    /// epoch and never past `end_time`.
    pub fn now(&self) -> DateTime<Utc> {
        let mut state = self.inner.borrow_mut();
        let mut now = state.raw_now();
        if let Some(end) = state.end_time {
            now = now.min(end);
        }
        now = now.max(state.last_reported);
        state.last_reported = now;
        now
    }

    /// Advance virtual time by `virtual_secs`.
    ///
    /// Instant mode bumps the counter with no real delay. Otherwise this
    /// blocks the caller for roughly `virtual_secs / speed` real seconds,
    /// polling in short increments so a concurrent `pause()` halts progress
    /// without corrupting the elapsed-time accounting.
    pub fn sleep(&self, virtual_secs: f64) {
        if !(virtual_secs > 0.0) {
            return;
        }
        let advance = Duration::from_std(StdDuration::from_secs_f64(virtual_secs))
            .unwrap_or_else(|_| Duration::days(36_500));

        let speed = self.inner.borrow().speed;
        if speed == 0.0 {
            let mut state = self.inner.borrow_mut();
            let target = state.virtual_anchor + advance;
            state.virtual_anchor = target;
            return;
        }

        let target = self.now() + advance;
        loop {
            if self.is_past_end() {
                return;
            }
            let now = self.now();
            if now >= target {
                return;
            }
            let remaining_virtual = (target - now)
                .to_std()
                .unwrap_or(StdDuration::ZERO)
                .as_secs_f64();
            let remaining_real = StdDuration::from_secs_f64(remaining_virtual / speed);
            std::thread::sleep(remaining_real.min(SLEEP_POLL));
        }
    }

    /// Freeze virtual time. Idempotent.
    pub fn pause(&self) {
        let mut state = self.inner.borrow_mut();
        if !state.paused {
            state.paused = true;
            state.pause_started = Some(Instant::now());
            tracing::debug!("Clock paused at {}", state.raw_now());
        }
    }

    /// Resume from a pause, accruing the paused duration so `now()` picks up
    /// exactly where it stopped.
    pub fn resume(&self) {
        let mut state = self.inner.borrow_mut();
        if state.paused {
            if let Some(at) = state.pause_started.take() {
                state.paused_total += at.elapsed();
            }
            state.paused = false;
            tracing::debug!("Clock resumed at {}", state.raw_now());
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.borrow().paused
    }

    /// Jump to an arbitrary virtual time by re-anchoring. Already-dispatched
    /// events are unaffected; the monotonicity watermark resets to the
    /// target so backwards jumps are honored.
    pub fn jump_to(&self, target: DateTime<Utc>) {
        let mut state = self.inner.borrow_mut();
        state.reanchor(target);
        state.last_reported = target;
        tracing::debug!("Clock jumped to {target}");
    }

    /// Jump to a time of day on the session's date.
    pub fn jump_to_time_of_day(&self, hour: u32, min: u32, sec: u32) -> Result<(), ConfigError> {
        let date = self.inner.borrow().start_time.date_naive();
        let target = date
            .and_hms_opt(hour, min, sec)
            .ok_or_else(|| ConfigError::InvalidTimeOfDay(format!("{hour:02}:{min:02}:{sec:02}")))?
            .and_utc();
        self.jump_to(target);
        Ok(())
    }

    /// Change the speed multiplier mid-run. Solves for a new anchor so that
    /// `now()` is continuous across the change.
    pub fn set_speed(&self, multiplier: f64) -> Result<(), ConfigError> {
        if multiplier < 0.0 || multiplier.is_nan() {
            return Err(ConfigError::NegativeSpeed(multiplier));
        }
        let current = self.now();
        let mut state = self.inner.borrow_mut();
        state.reanchor(current);
        state.speed = multiplier;
        tracing::debug!("Clock speed set to {multiplier}x at {current}");
        Ok(())
    }

    /// Authoritative termination signal: has the underlying (unclamped)
    /// time reached `end_time`?
    pub fn is_past_end(&self) -> bool {
        let state = self.inner.borrow();
        match state.end_time {
            Some(end) => state.raw_now() >= end,
            None => false,
        }
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.inner.borrow().speed
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.inner.borrow().start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.inner.borrow().end_time
    }

    pub fn status(&self) -> ClockStatus {
        let current = self.now();
        let state = self.inner.borrow();
        ClockStatus {
            current_time: current,
            start_time: state.start_time,
            end_time: state.end_time,
            speed_multiplier: state.speed,
            paused: state.paused,
            virtual_elapsed_secs: (current - state.start_time)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        }
    }
}
