//! The edge tick loop (spec.md §4.1, §5). Single-threaded cooperative:
//! one call to `Scheduler::tick` does one unit of work (flush, sample,
//! cost-cap check, policy refresh, command handling) and returns the
//! delay the caller should sleep before the next tick.

use std::time::Duration;

use chrono::Utc;
use ew_protocol::device::OperationMode;
use ew_protocol::telemetry::{IngestRequest, MetricValue, TelemetryPointInput};
use ew_buffer::LocalBuffer;

use crate::command_state::CommandState;
use crate::cost_caps::{CostCaps, SampleReason};
use crate::error::CallOutcome;
use crate::http_client::EdgeHttpClient;
use crate::policy_cache::PolicyCache;
use crate::power_saver::PowerSaver;
use crate::sensors::{Metrics, MetricSource, OilLifeSource};

/// Resolved cadence for the current tick, per spec.md §4.1's table.
/// Disabled devices produce no telemetry but still poll the policy
/// endpoint at the sleep cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cadence {
    pub sample_interval_s: u32,
    pub heartbeat_interval_s: u32,
    pub produces_telemetry: bool,
}

pub fn resolve_cadence(
    operation_mode: OperationMode,
    sleep_poll_interval_s: u32,
    power_saver_active: bool,
    critical: bool,
    reporting: &ew_protocol::policy::ReportingCadences,
) -> Cadence {
    match operation_mode {
        OperationMode::Disabled => Cadence {
            sample_interval_s: sleep_poll_interval_s,
            heartbeat_interval_s: sleep_poll_interval_s,
            produces_telemetry: false,
        },
        OperationMode::Sleep => Cadence {
            sample_interval_s: sleep_poll_interval_s,
            heartbeat_interval_s: sleep_poll_interval_s,
            produces_telemetry: true,
        },
        OperationMode::Active if power_saver_active => Cadence {
            sample_interval_s: reporting.saver_sample_interval_s,
            heartbeat_interval_s: reporting.saver_heartbeat_interval_s,
            produces_telemetry: true,
        },
        OperationMode::Active if critical => Cadence {
            sample_interval_s: reporting.alert_sample_interval_s,
            heartbeat_interval_s: reporting.heartbeat_interval_s,
            produces_telemetry: true,
        },
        OperationMode::Active => Cadence {
            sample_interval_s: reporting.sample_interval_s,
            heartbeat_interval_s: reporting.heartbeat_interval_s,
            produces_telemetry: true,
        },
    }
}

/// Local mirror of the server's hysteresis check (spec.md §4.3),
/// consulted only to decide whether *this device* should sample at
/// the tighter critical cadence — it has no bearing on the server's
/// authoritative alert state, which is recomputed independently on
/// ingest.
struct CriticalWatch {
    open: bool,
}

impl CriticalWatch {
    fn new() -> Self {
        Self { open: false }
    }

    fn observe(&mut self, metrics: &Metrics, thresholds: &ew_protocol::policy::AlertThresholds) {
        let pairs: &[(&str, ew_protocol::policy::HysteresisPair)] = &[
            ("water_pressure_psi", thresholds.water_pressure),
            ("oil_pressure_psi", thresholds.oil_pressure),
            ("battery_v", thresholds.battery_v),
        ];
        let mut any_low = false;
        for (key, pair) in pairs {
            if let Some(MetricValue::Number(v)) = metrics.get(*key) {
                if *v < pair.low {
                    any_low = true;
                }
                if *v >= pair.recover {
                    // this metric recovered; doesn't clear `open` alone
                }
            }
        }
        if any_low {
            self.open = true;
        } else {
            // Clear only when every watched metric is at/above recover,
            // mirroring the server's non-strict `>=` resolve rule.
            let all_recovered = pairs.iter().all(|(key, pair)| match metrics.get(*key) {
                Some(MetricValue::Number(v)) => *v >= pair.recover,
                _ => true,
            });
            if all_recovered {
                self.open = false;
            }
        }
    }
}

pub struct Scheduler {
    device_id: String,
    buffer: LocalBuffer,
    client: EdgeHttpClient,
    policy_cache: PolicyCache,
    command_state: CommandState,
    cost_caps: CostCaps,
    power_saver: PowerSaver,
    sources: Vec<Box<dyn MetricSource>>,
    oil_life: Option<OilLifeSource>,
    critical_watch: CriticalWatch,
    backoff_attempt: u32,
    message_seq: u64,
    last_heartbeat_at: Option<chrono::DateTime<Utc>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device_id: String,
        buffer: LocalBuffer,
        client: EdgeHttpClient,
        policy_cache: PolicyCache,
        command_state: CommandState,
        cost_caps: CostCaps,
        power_saver: PowerSaver,
        sources: Vec<Box<dyn MetricSource>>,
        oil_life: Option<OilLifeSource>,
    ) -> Self {
        Self {
            device_id,
            buffer,
            client,
            policy_cache,
            command_state,
            cost_caps,
            power_saver,
            sources,
            oil_life,
            critical_watch: CriticalWatch::new(),
            backoff_attempt: 0,
            message_seq: 0,
            last_heartbeat_at: None,
        }
    }

    fn next_message_id(&mut self) -> String {
        self.message_seq += 1;
        format!("{}-{}-{}", self.device_id, Utc::now().timestamp_millis(), self.message_seq)
    }

    fn sample(&mut self) -> Metrics {
        let mut metrics = Metrics::new();
        for source in &mut self.sources {
            metrics.extend(source.read_metrics());
        }
        if let Some(oil) = &mut self.oil_life {
            oil.fold_into(&mut metrics);
        }
        metrics
    }

    /// One full tick: refresh policy, flush the buffer, produce and
    /// send/enqueue this tick's sample, apply cost caps, handle the
    /// pending command. Returns how long the caller should sleep
    /// before calling `tick` again.
    pub async fn tick(&mut self) -> Duration {
        let now = Utc::now();
        self.refresh_policy_if_due().await;

        let Some(cached) = self.policy_cache.current().cloned() else {
            // No policy fetched yet; poll again shortly rather than
            // guessing cadences.
            return Duration::from_secs(5);
        };

        let _ = self.cost_caps.roll_if_new_day(now);

        let shutdown_gated = cached.response.policy.operation_defaults.shutdown_gated;
        if let Ok(Some(overrides)) = self.command_state.maybe_apply(
            cached.response.pending_control_command.as_ref(),
            shutdown_gated,
            now,
        ) {
            tracing::info!(?overrides, "applied pending control command");
        }
        let _ = self.command_state.retry_pending_ack(&self.client).await;

        if self.command_state.shutdown_ready(now) {
            tracing::warn!("shutdown grace elapsed and ack cleared, executing remote shutdown");
            let _ = self.command_state.clear_shutdown();
            // Process exit is the caller's responsibility (main.rs);
            // the scheduler only decides *that* shutdown should happen.
        }

        self.flush(&cached.response.policy.reporting, now).await;

        let operation_mode = cached.response.device_operation_mode;

        let metrics = if operation_mode != OperationMode::Disabled {
            Some(self.sample())
        } else {
            None
        };

        if let Some(metrics) = &metrics {
            self.critical_watch.observe(metrics, &cached.response.policy.alert_thresholds);
        }

        let input_voltage_v = metrics.as_ref().and_then(|m| m.get("power_input_v")).and_then(MetricValue::as_f64);
        let input_watts = metrics.as_ref().and_then(|m| m.get("power_input_watts")).and_then(MetricValue::as_f64);
        let power_saver_active = self
            .power_saver
            .observe(&cached.response.policy.power_management, input_voltage_v, input_watts, now)
            .unwrap_or(self.power_saver.is_active());

        let cadence = resolve_cadence(
            operation_mode,
            cached.response.device_sleep_poll_interval_s,
            power_saver_active,
            self.critical_watch.open,
            &cached.response.policy.reporting,
        );

        if let Some(metrics) = metrics {
            self.produce_sample(metrics, &cached.response.policy.cost_caps, &cadence, now).await;
        }

        Duration::from_secs(cadence.sample_interval_s as u64)
    }

    async fn refresh_policy_if_due(&mut self) {
        let etag = self.policy_cache.etag().map(str::to_string);
        match self.client.get_device_policy(etag.as_deref()).await {
            Ok(Some((response, etag))) => {
                if let Err(e) = self.policy_cache.update(response, etag) {
                    tracing::warn!(error = %e, "failed to persist refreshed policy");
                }
            }
            Ok(None) => {}
            Err(()) => {
                tracing::debug!("policy refresh failed, continuing with cached policy");
            }
        }
    }

    /// Flush algorithm steps 1-2 (spec.md §4.1): pop up to
    /// `max_points_per_batch`, POST, and react to the outcome.
    async fn flush(&mut self, reporting: &ew_protocol::policy::ReportingCadences, now: chrono::DateTime<Utc>) {
        let batch = match self.buffer.dequeue_batch(reporting.max_points_per_batch).await {
            Ok(batch) if !batch.is_empty() => batch,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read local buffer for flush");
                return;
            }
        };

        let mut points = Vec::with_capacity(batch.len());
        let mut total_bytes = 0u64;
        for message in &batch {
            match serde_json::from_slice::<TelemetryPointInput>(&message.payload) {
                Ok(point) => {
                    total_bytes += message.payload.len() as u64;
                    points.push(point);
                }
                Err(e) => {
                    tracing::warn!(error = %e, message_id = %message.message_id, "dropping malformed buffered row");
                    let _ = self.buffer.delete(&message.message_id).await;
                }
            }
        }
        if points.is_empty() {
            return;
        }

        match self.client.post_ingest(&IngestRequest { points }).await {
            CallOutcome::Success(_) => {
                for message in &batch {
                    let _ = self.buffer.delete(&message.message_id).await;
                }
                let _ = self.cost_caps.record_bytes(total_bytes);
                self.backoff_attempt = 0;
            }
            CallOutcome::ContractRejected | CallOutcome::ClientRejected { .. } => {
                for message in &batch {
                    let _ = self.buffer.delete(&message.message_id).await;
                }
                self.backoff_attempt = 0;
            }
            CallOutcome::Transient => {
                // Per SPEC_FULL.md §8 decision 2, a transient failure
                // (including a 503 publish_failed) is retained and
                // retried with backoff; rows stay in the buffer.
                self.backoff_attempt = self.backoff_attempt.saturating_add(1);
                let delay = crate::http_client::backoff_delay(
                    self.backoff_attempt,
                    reporting.backoff_initial_s,
                    reporting.backoff_max_s,
                    rand::random::<f64>(),
                );
                tracing::debug!(?delay, attempt = self.backoff_attempt, "flush backing off");
            }
        }
        let _ = now;
    }

    /// Steps 3-4: produce this tick's sample, respect the cost cap,
    /// and either post directly or buffer it.
    async fn produce_sample(
        &mut self,
        metrics: Metrics,
        cost_caps: &ew_protocol::policy::CostCaps,
        cadence: &Cadence,
        now: chrono::DateTime<Utc>,
    ) {
        let due_for_heartbeat = self.last_heartbeat_at.map_or(true, |t| {
            (now - t).num_seconds() >= cadence.heartbeat_interval_s as i64
        });
        let reason = if self.message_seq == 0 {
            SampleReason::Startup
        } else if due_for_heartbeat {
            SampleReason::Heartbeat
        } else {
            SampleReason::Normal
        };
        if matches!(reason, SampleReason::Heartbeat | SampleReason::Startup) {
            self.last_heartbeat_at = Some(now);
        }

        if !self.cost_caps.allows(reason, cost_caps.max_bytes_per_day) {
            tracing::debug!("daily byte cap reached, suppressing non-heartbeat sample");
            return;
        }

        let point = TelemetryPointInput { message_id: self.next_message_id(), ts: now, metrics };
        let payload = match serde_json::to_vec(&point) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode sample, dropping");
                return;
            }
        };

        let queue_depth = self.buffer.metrics().await.map(|m| m.queue_depth).unwrap_or(0);
        let backing_off = self.backoff_attempt > 0;

        if queue_depth > 0 || backing_off {
            self.enqueue(&point.message_id, &payload, now).await;
            return;
        }

        let request = IngestRequest { points: vec![point.clone()] };
        match self.client.post_ingest(&request).await {
            CallOutcome::Success(_) => {
                let _ = self.cost_caps.record_bytes(payload.len() as u64);
            }
            CallOutcome::ContractRejected | CallOutcome::ClientRejected { .. } => {
                tracing::warn!("direct sample rejected, dropping");
            }
            CallOutcome::Transient => {
                self.enqueue(&point.message_id, &payload, now).await;
            }
        }
    }

    async fn enqueue(&mut self, message_id: &str, payload: &[u8], now: chrono::DateTime<Utc>) {
        match self.buffer.enqueue(message_id, payload, now).await {
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "buffer enqueue failed even after eviction retry, dropping point");
            }
        }
    }
}
