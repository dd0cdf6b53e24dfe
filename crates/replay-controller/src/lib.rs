//! Wires the clock, feeds, broker, and replayer into a runnable session and
//! aggregates the run result.

pub mod controller;
pub mod observer;
pub mod result;

pub use controller::{ControllerState, SimulationController};
pub use observer::{ReplayObserver, TracingObserver};
pub use result::{PositionSnapshot, RunResult};
