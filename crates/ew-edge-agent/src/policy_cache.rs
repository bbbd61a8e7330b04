//! Cached `EdgePolicy` + ETag, persisted so a restart doesn't lose the
//! last-known-good policy or force a full refetch (spec.md §6).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::http_client::DevicePolicyResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPolicy {
    pub response: DevicePolicyResponse,
    pub etag: String,
}

pub struct PolicyCache {
    path: PathBuf,
    current: Option<CachedPolicy>,
}

impl PolicyCache {
    pub fn file_name(state_dir: &Path) -> PathBuf {
        state_dir.join("policy_cache.json")
    }

    /// Loads whatever was last persisted, or starts empty (the
    /// scheduler's first tick then has no cadences to resolve from
    /// until the first successful `GET /device-policy`).
    pub fn load(state_dir: &Path) -> Self {
        let path = Self::file_name(state_dir);
        let current = crate::sidecar::read_or_default(&path);
        Self { path, current }
    }

    pub fn current(&self) -> Option<&CachedPolicy> {
        self.current.as_ref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.etag.as_str())
    }

    /// Stores a freshly fetched policy and persists it immediately —
    /// cadence changes must survive a crash right after the fetch that
    /// produced them.
    pub fn update(&mut self, response: DevicePolicyResponse, etag: String) -> Result<(), crate::error::SidecarError> {
        let cached = CachedPolicy { response, etag };
        crate::sidecar::write_atomic(&self.path, &cached)?;
        self.current = Some(cached);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ew_protocol::device::OperationMode;
    use ew_protocol::policy::EdgePolicy;

    fn sample_response() -> DevicePolicyResponse {
        let policy: EdgePolicy = serde_yaml::from_str(
            r#"
version: v1
cache_max_age_s: 300
reporting: {sample_interval_s: 300, alert_sample_interval_s: 60, heartbeat_interval_s: 300, saver_sample_interval_s: 900, saver_heartbeat_interval_s: 900, max_points_per_batch: 200, buffer_max_points: 50000, buffer_max_age_s: 604800, backoff_initial_s: 5.0, backoff_max_s: 300.0}
delta_thresholds: {}
alert_thresholds: {water_pressure: {low: 30.0, recover: 32.0}, oil_pressure: {low: 20.0, recover: 25.0}, oil_level_pct: {low: 15.0, recover: 20.0}, oil_life_pct: {low: 10.0, recover: 15.0}, battery_v: {low: 11.5, recover: 12.0}, signal_rssi_dbm: {low: -110.0, recover: -100.0}, microphone_offline_db: -60.0, microphone_offline_open_consecutive_samples: 3, microphone_offline_resolve_consecutive_samples: 3}
cost_caps: {max_bytes_per_day: 5000000, max_snapshots_per_day: 50, max_media_uploads_per_day: 10}
power_management: {enabled: true, input_warn_min_v: 11.0, input_critical_min_v: 10.0, max_input_watts: 15.0, sustained_window_s: 1800}
operation_defaults: {control_command_ttl_s: 86400, default_sleep_poll_interval_s: 604800, disable_requires_manual_restart: false, shutdown_gated: true, default_shutdown_grace_s: 30}
"#,
        )
        .unwrap();
        DevicePolicyResponse {
            policy,
            device_operation_mode: OperationMode::Active,
            device_sleep_poll_interval_s: 604_800,
            pending_control_command: None,
        }
    }

    #[test]
    fn empty_cache_has_no_etag() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PolicyCache::load(dir.path());
        assert!(cache.etag().is_none());
    }

    #[test]
    fn update_persists_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PolicyCache::load(dir.path());
        cache.update(sample_response(), "\"abc\"".to_string()).unwrap();
        assert_eq!(cache.etag(), Some("\"abc\""));

        let reloaded = PolicyCache::load(dir.path());
        assert_eq!(reloaded.etag(), Some("\"abc\""));
    }
}
