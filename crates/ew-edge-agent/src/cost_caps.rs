//! Daily cost-cap counters (bytes/snapshots/media uploads), reset at
//! UTC midnight, persisted so a restart doesn't reset the budget early
//! (spec.md §4.1 step 4, grounded on `original_source/agent/cost_caps.py`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SidecarError;

/// A point's reason for being produced, used to decide whether it
/// survives the cap once the daily byte budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleReason {
    Heartbeat,
    Startup,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CostCapState {
    day: NaiveDate,
    bytes_sent_today: u64,
    snapshots_today: u32,
    uploads_today: u32,
}

impl CostCapState {
    fn fresh(day: NaiveDate) -> Self {
        Self { day, bytes_sent_today: 0, snapshots_today: 0, uploads_today: 0 }
    }
}

pub struct CostCaps {
    path: std::path::PathBuf,
    state: CostCapState,
}

impl CostCaps {
    pub fn file_name(state_dir: &std::path::Path) -> std::path::PathBuf {
        state_dir.join("cost_caps.json")
    }

    pub fn load(state_dir: &std::path::Path, now: DateTime<Utc>) -> Self {
        let path = Self::file_name(state_dir);
        let today = now.date_naive();
        let state = crate::sidecar::read_or_default::<CostCapState>(&path)
            .filter(|s| s.day == today)
            .unwrap_or_else(|| CostCapState::fresh(today));
        Self { path, state }
    }

    fn persist(&self) -> Result<(), SidecarError> {
        crate::sidecar::write_atomic(&self.path, &self.state)
    }

    /// Rolls the counters over if `now` has crossed into a new UTC day.
    pub fn roll_if_new_day(&mut self, now: DateTime<Utc>) -> Result<(), SidecarError> {
        let today = now.date_naive();
        if self.state.day != today {
            self.state = CostCapState::fresh(today);
            self.persist()?;
        }
        Ok(())
    }

    /// Whether a point with `reason` may be sent given today's budget
    /// (spec.md §4.1 step 4): once the byte cap is reached, only
    /// heartbeat/startup reasons still go through.
    pub fn allows(&self, reason: SampleReason, max_bytes_per_day: u64) -> bool {
        if self.state.bytes_sent_today < max_bytes_per_day {
            return true;
        }
        matches!(reason, SampleReason::Heartbeat | SampleReason::Startup)
    }

    pub fn record_bytes(&mut self, n: u64) -> Result<(), SidecarError> {
        self.state.bytes_sent_today += n;
        self.persist()
    }

    pub fn bytes_sent_today(&self) -> u64 {
        self.state.bytes_sent_today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_everything_under_budget() {
        let dir = tempfile::tempdir().unwrap();
        let caps = CostCaps::load(dir.path(), Utc::now());
        assert!(caps.allows(SampleReason::Normal, 1000));
    }

    #[test]
    fn blocks_normal_but_not_heartbeat_once_over_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut caps = CostCaps::load(dir.path(), Utc::now());
        caps.record_bytes(2000).unwrap();
        assert!(!caps.allows(SampleReason::Normal, 1000));
        assert!(caps.allows(SampleReason::Heartbeat, 1000));
        assert!(caps.allows(SampleReason::Startup, 1000));
    }

    #[test]
    fn counters_persist_across_reload_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        {
            let mut caps = CostCaps::load(dir.path(), now);
            caps.record_bytes(500).unwrap();
        }
        let caps = CostCaps::load(dir.path(), now);
        assert_eq!(caps.bytes_sent_today(), 500);
    }

    #[test]
    fn counters_reset_on_new_day() {
        let dir = tempfile::tempdir().unwrap();
        let day1 = Utc::now();
        {
            let mut caps = CostCaps::load(dir.path(), day1);
            caps.record_bytes(500).unwrap();
        }
        let day2 = day1 + chrono::Duration::days(1);
        let caps = CostCaps::load(dir.path(), day2);
        assert_eq!(caps.bytes_sent_today(), 0);
    }

    #[test]
    fn roll_if_new_day_resets_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let day1 = Utc::now();
        let mut caps = CostCaps::load(dir.path(), day1);
        caps.record_bytes(500).unwrap();
        caps.roll_if_new_day(day1 + chrono::Duration::days(1)).unwrap();
        assert_eq!(caps.bytes_sent_today(), 0);
    }
}
