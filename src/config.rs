use std::path::PathBuf;
use std::time::Duration;

use crate::limits::MAX_RANGE_DAYS;

/// Host configuration, read from `CREWPLAN_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends since last compaction before the compactor rewrites it.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub reminder_interval: Duration,
    /// Reminders go out for days this far ahead of today.
    pub reminder_lead_days: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            reminder_interval: Duration::from_secs(3600),
            reminder_lead_days: 1,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparsable or out-of-range values
    /// fall back to defaults. Intervals must be positive.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse_u64 = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        let parse_secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            data_dir: lookup("CREWPLAN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: lookup("CREWPLAN_METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: parse_u64("CREWPLAN_COMPACT_THRESHOLD", defaults.compact_threshold),
            compact_interval: parse_secs("CREWPLAN_COMPACT_INTERVAL_SECS", defaults.compact_interval),
            reminder_interval: parse_secs(
                "CREWPLAN_REMINDER_INTERVAL_SECS",
                defaults.reminder_interval,
            ),
            reminder_lead_days: lookup("CREWPLAN_REMINDER_LEAD_DAYS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|days| *days <= MAX_RANGE_DAYS as u64)
                .unwrap_or(defaults.reminder_lead_days),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("crewplan.wal")
    }
}
