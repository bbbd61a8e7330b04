//! Metric producers. A closed set of registered sources, composed at
//! startup, each contributing to the single metric map sampled per
//! tick — mirrors the teacher's tool-registry pattern, minus dispatch
//! by name (every source always runs).

use std::collections::BTreeMap;

use ew_protocol::telemetry::MetricValue;

pub type Metrics = BTreeMap<String, MetricValue>;

/// A metric producer. Implementations must never panic; a failed read
/// is reported as an empty map so one bad sensor can't halt the tick.
pub trait MetricSource: Send + Sync {
    fn read_metrics(&mut self) -> Metrics;
}

/// Deterministic source for local development and tests, mirroring
/// `mock_sensors.py`'s oscillating-pressure simulation.
pub struct MockMetricSource {
    tick: u64,
}

impl Default for MockMetricSource {
    fn default() -> Self {
        Self { tick: 0 }
    }
}

impl MetricSource for MockMetricSource {
    fn read_metrics(&mut self) -> Metrics {
        self.tick += 1;
        let phase = (self.tick as f64 / 10.0).sin();
        let water_pressure = 45.0 + 10.0 * phase;
        let pump_on = water_pressure > 30.0;
        let oil_pressure = if pump_on { 55.0 + phase } else { 0.0 };

        let mut metrics = Metrics::new();
        metrics.insert(
            "water_pressure_psi".to_string(),
            MetricValue::Number(water_pressure),
        );
        metrics.insert(
            "oil_pressure_psi".to_string(),
            MetricValue::Number(oil_pressure),
        );
        metrics.insert("pump_on".to_string(), MetricValue::Bool(pump_on));
        metrics.insert("battery_v".to_string(), MetricValue::Number(12.4));
        metrics.insert(
            "signal_rssi_dbm".to_string(),
            MetricValue::Number(-65.0),
        );
        metrics
    }
}

/// Tracks cumulative pump runtime and derives `oil_life_pct` from it.
/// `oil_life` itself is out of scope as a standalone CLI tool, but the
/// derived telemetry metric it produces is in-scope vocabulary the
/// alert evaluator consumes (spec.md §9 supplement).
pub struct OilLifeSource {
    runtime_s: f64,
    is_running: bool,
    max_run_hours: f64,
    run_on_threshold_psi: f64,
    run_off_threshold_psi: f64,
    tick_interval_s: f64,
}

impl OilLifeSource {
    pub fn new(max_run_hours: f64, tick_interval_s: f64) -> Self {
        Self {
            runtime_s: 0.0,
            is_running: false,
            max_run_hours,
            run_on_threshold_psi: 30.0,
            run_off_threshold_psi: 10.0,
            tick_interval_s,
        }
    }

    pub fn with_runtime_s(mut self, runtime_s: f64) -> Self {
        self.runtime_s = runtime_s;
        self
    }

    /// `derive_running_state` from `oil_life.py`: a boolean `pump_on`
    /// reading takes priority; otherwise hysteresis on oil pressure.
    fn derive_running(&self, metrics: &Metrics) -> bool {
        if let Some(MetricValue::Bool(pump_on)) = metrics.get("pump_on") {
            return *pump_on;
        }
        let pressure = metrics.get("oil_pressure_psi").and_then(MetricValue::as_f64);
        match pressure {
            None => self.is_running,
            Some(p) if self.is_running => p > self.run_off_threshold_psi,
            Some(p) => p >= self.run_on_threshold_psi,
        }
    }

    /// `compute_oil_life_pct`: linear depletion over `max_run_hours`
    /// of cumulative runtime, clamped to `[0, 100]`.
    fn compute_pct(&self) -> f64 {
        if self.max_run_hours <= 0.0 {
            return 0.0;
        }
        let runtime_hours = self.runtime_s.max(0.0) / 3600.0;
        let pct = 100.0 * (1.0 - runtime_hours / self.max_run_hours);
        pct.clamp(0.0, 100.0)
    }

    /// Folds this tick's derived reading into `metrics` given the
    /// other sources' already-produced readings.
    pub fn fold_into(&mut self, metrics: &mut Metrics) {
        self.is_running = self.derive_running(metrics);
        if self.is_running {
            self.runtime_s += self.tick_interval_s;
        }
        metrics.insert(
            "oil_life_pct".to_string(),
            MetricValue::Number(self.compute_pct()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_source_produces_expected_keys() {
        let mut source = MockMetricSource::default();
        let metrics = source.read_metrics();
        assert!(metrics.contains_key("water_pressure_psi"));
        assert!(metrics.contains_key("pump_on"));
        assert!(metrics.contains_key("battery_v"));
    }

    #[test]
    fn oil_life_depletes_only_while_running() {
        let mut oil = OilLifeSource::new(100.0, 3600.0).with_runtime_s(0.0);
        let mut metrics = Metrics::new();
        metrics.insert("pump_on".to_string(), MetricValue::Bool(true));
        oil.fold_into(&mut metrics);
        let pct_after_running = metrics["oil_life_pct"].as_f64().unwrap();
        assert!(pct_after_running < 100.0);

        let mut metrics2 = Metrics::new();
        metrics2.insert("pump_on".to_string(), MetricValue::Bool(false));
        oil.fold_into(&mut metrics2);
        let pct_after_idle = metrics2["oil_life_pct"].as_f64().unwrap();
        assert_eq!(pct_after_idle, pct_after_running);
    }

    #[test]
    fn oil_life_never_goes_negative() {
        let mut oil = OilLifeSource::new(1.0, 3600.0).with_runtime_s(1_000_000.0);
        let mut metrics = Metrics::new();
        metrics.insert("pump_on".to_string(), MetricValue::Bool(false));
        oil.fold_into(&mut metrics);
        assert_eq!(metrics["oil_life_pct"].as_f64().unwrap(), 0.0);
    }
}
