//! Run configuration for a replay session.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The time window a session replays, in session-local (UTC) times on the
/// simulation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    /// Regular session, 09:30-16:00.
    MarketHours,
    /// 04:00-09:30.
    PreMarket,
    /// 04:00-20:00.
    FullDay,
    Custom { start: NaiveTime, end: NaiveTime },
}

impl TimeWindow {
    /// Build a window from loosely specified parts. A named preset wins;
    /// otherwise an explicit start time is required.
    pub fn from_parts(
        preset: Option<&str>,
        start: Option<NaiveTime>,
        end: Option<NaiveTime>,
    ) -> Result<Self, ConfigError> {
        if let Some(name) = preset {
            return match name {
                "market_hours" => Ok(TimeWindow::MarketHours),
                "premarket" => Ok(TimeWindow::PreMarket),
                "full_day" => Ok(TimeWindow::FullDay),
                other => Err(ConfigError::InvalidTimeOfDay(format!(
                    "unknown window preset '{other}'"
                ))),
            };
        }
        let start = start.ok_or(ConfigError::MissingStartTime)?;
        let end = end.unwrap_or_else(|| NaiveTime::from_hms_opt(20, 0, 0).unwrap());
        if start >= end {
            return Err(ConfigError::InvalidWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(TimeWindow::Custom { start, end })
    }

    pub fn session_times(&self) -> (NaiveTime, NaiveTime) {
        match self {
            TimeWindow::MarketHours => (
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            ),
            TimeWindow::PreMarket => (
                NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            ),
            TimeWindow::FullDay => (
                NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            ),
            TimeWindow::Custom { start, end } => (*start, *end),
        }
    }

    /// Absolute start/end of the window on the given date.
    pub fn bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let (start, end) = self.session_times();
        (
            date.and_time(start).and_utc(),
            date.and_time(end).and_utc(),
        )
    }
}

/// Which slippage model the broker applies to fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageModel {
    None,
    #[default]
    Fixed,
    Adaptive,
}

/// Slippage parameters. The adaptive tier multipliers are empirical
/// constants; they are plain overridable fields rather than hardcoded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlippageConfig {
    pub model: SlippageModel,
    /// Base slippage as a decimal, e.g. 0.001 = 0.1%.
    pub slippage_pct: f64,
    /// Multiplier for stocks under $1.
    pub sub_dollar_mult: f64,
    /// Multiplier for stocks under $5.
    pub sub_five_mult: f64,
    /// Multiplier for stocks under $10.
    pub sub_ten_mult: f64,
    /// Order-size-to-daily-volume ratio above which impact scaling kicks in.
    pub volume_impact_threshold: f64,
    /// Impact scale: slippage *= 1 + order_pct * scale.
    pub volume_impact_scale: f64,
    /// Hard cap on total slippage.
    pub max_slippage_pct: f64,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            model: SlippageModel::Fixed,
            slippage_pct: 0.001,
            sub_dollar_mult: 3.0,
            sub_five_mult: 2.0,
            sub_ten_mult: 1.5,
            volume_impact_threshold: 0.01,
            volume_impact_scale: 10.0,
            max_slippage_pct: 0.15,
        }
    }
}

/// Configuration for a single replay run. Owned by the external config/CLI
/// layer; validated here before any component is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// The historical date to replay.
    pub date: NaiveDate,
    pub window: TimeWindow,
    /// 0 = instant, 1 = real-time, N = N-times accelerated.
    pub speed_multiplier: f64,
    pub starting_cash: f64,
    pub slippage: SlippageConfig,
    /// Max order size as a fraction of the ticker's daily volume.
    pub max_volume_pct: f64,
    /// Event-processing errors tolerated before the run terminates early.
    pub max_critical_errors: u32,
    pub use_cache: bool,
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            window: TimeWindow::MarketHours,
            speed_multiplier: 0.0,
            starting_cash: 10_000.0,
            slippage: SlippageConfig::default(),
            max_volume_pct: 0.05,
            max_critical_errors: 10,
            use_cache: true,
            cache_dir: PathBuf::from(".replay-cache"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.speed_multiplier < 0.0 {
            return Err(ConfigError::NegativeSpeed(self.speed_multiplier));
        }
        if self.starting_cash <= 0.0 {
            return Err(ConfigError::InvalidCash(self.starting_cash));
        }
        if !(0.0..=1.0).contains(&self.max_volume_pct) {
            return Err(ConfigError::InvalidPercent {
                field: "max_volume_pct",
                value: self.max_volume_pct,
            });
        }
        if self.slippage.slippage_pct < 0.0 {
            return Err(ConfigError::InvalidPercent {
                field: "slippage_pct",
                value: self.slippage.slippage_pct,
            });
        }
        let (start, end) = self.window.session_times();
        if start >= end {
            return Err(ConfigError::InvalidWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(())
    }

    /// Absolute simulation window for this run.
    pub fn session_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.window.bounds(self.date)
    }
}

/// Parse "HH:MM" or "HH:MM:SS" into a time of day.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| ConfigError::InvalidTimeOfDay(raw.to_string()))
}
