//! Optional ambient clock registry.
//!
//! Legacy call sites that cannot take a clock handle can resolve "the
//! current clock" here. The core never relies on it, and the controller
//! clears it between runs so nothing bleeds across sessions.

use std::cell::RefCell;

use crate::clock::SharedClock;

thread_local! {
    static AMBIENT_CLOCK: RefCell<Option<SharedClock>> = const { RefCell::new(None) };
}

/// Install the clock for the current run.
pub fn set_ambient_clock(clock: SharedClock) {
    AMBIENT_CLOCK.with(|slot| *slot.borrow_mut() = Some(clock));
}

/// The currently installed clock, if any.
pub fn ambient_clock() -> Option<SharedClock> {
    AMBIENT_CLOCK.with(|slot| slot.borrow().clone())
}

/// Remove the installed clock. Called from controller cleanup.
pub fn clear_ambient_clock() {
    AMBIENT_CLOCK.with(|slot| *slot.borrow_mut() = None);
}
