//! Virtual time for replay sessions.
//!
//! Every component reads time exclusively through a [`SimClock`] handle, so a
//! whole session can run instantly, in real time, or at an arbitrary
//! acceleration without any component knowing the difference.

pub mod ambient;
pub mod clock;

pub use ambient::{ambient_clock, clear_ambient_clock, set_ambient_clock};
pub use clock::{ClockStatus, SharedClock, SimClock};
