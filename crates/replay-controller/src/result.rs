use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use replay_core::SkippedRecords;
use sim_broker::PortfolioStats;

/// Per-ticker position state at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub quantity: u64,
    pub avg_cost: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
}

/// The output contract of a run. Always produced, even when the run
/// terminated early on its error budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub events_processed: u64,
    pub critical_errors: u32,
    /// Source records dropped during parsing (bad timestamps).
    pub skipped_records: SkippedRecords,
    pub portfolio: PortfolioStats,
    pub positions: HashMap<String, PositionSnapshot>,
    pub orders_count: usize,
    /// Log artifacts produced by observer collaborators.
    pub artifacts: Vec<PathBuf>,
}
