//! Chronological event queue and dispatch loop for replay sessions.

pub mod events;
pub mod loader;
pub mod queue;
pub mod replayer;

pub use events::{EventType, SimulationEvent};
pub use loader::{load_package, push_market_session, LoadStats};
pub use queue::EventQueue;
pub use replayer::{Replayer, ReplayStats};
