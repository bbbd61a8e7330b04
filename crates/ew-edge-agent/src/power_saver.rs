//! Power-saver cadence transition: tracks a sustained window of
//! out-of-range input voltage or excessive input wattage (spec.md §4.1
//! cadence table, §9 Open Question). Per SPEC_FULL.md §8 decision 1,
//! the sustained window is persisted across restarts so a device that
//! reboots mid-window doesn't lose its progress toward entering
//! power-saver mode.

use chrono::{DateTime, Utc};
use ew_protocol::policy::PowerManagement;
use serde::{Deserialize, Serialize};

use crate::error::SidecarError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PowerState {
    out_of_range_since: Option<DateTime<Utc>>,
    saver_active: bool,
}

pub struct PowerSaver {
    path: std::path::PathBuf,
    state: PowerState,
}

impl PowerSaver {
    pub fn file_name(state_dir: &std::path::Path) -> std::path::PathBuf {
        state_dir.join("power_state.json")
    }

    pub fn load(state_dir: &std::path::Path) -> Self {
        let path = Self::file_name(state_dir);
        let state = crate::sidecar::read_or_default(&path).unwrap_or_default();
        Self { path, state }
    }

    fn persist(&self) -> Result<(), SidecarError> {
        crate::sidecar::write_atomic(&self.path, &self.state)
    }

    pub fn is_active(&self) -> bool {
        self.state.saver_active
    }

    /// Folds in one tick's input readings. `input_voltage_v`/
    /// `input_watts` are `None` when the platform has no power-input
    /// sensor, in which case power-saver can never trigger.
    pub fn observe(
        &mut self,
        policy: &PowerManagement,
        input_voltage_v: Option<f64>,
        input_watts: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<bool, SidecarError> {
        if !policy.enabled {
            self.state.out_of_range_since = None;
            self.state.saver_active = false;
            self.persist()?;
            return Ok(false);
        }

        let out_of_range = input_voltage_v.is_some_and(|v| v < policy.input_warn_min_v)
            || input_watts.is_some_and(|w| w > policy.max_input_watts);

        if out_of_range {
            let since = *self.state.out_of_range_since.get_or_insert(now);
            let sustained = (now - since).num_seconds() >= policy.sustained_window_s as i64;
            if sustained && !self.state.saver_active {
                self.state.saver_active = true;
                tracing::warn!("power-saver activated: sustained out-of-range input");
            }
        } else if self.state.saver_active || self.state.out_of_range_since.is_some() {
            // Edge-triggered recovery: back in range clears the window
            // and exits power-saver immediately, taking effect next tick.
            self.state.out_of_range_since = None;
            self.state.saver_active = false;
            tracing::info!("power-saver cleared: input back in range");
        }

        self.persist()?;
        Ok(self.state.saver_active)
    }
}
