//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - Prometheus metrics (tick latency, active policies, scale events,
//!   sample failures, per-workload CPU)
//! - Structured JSON logging with tracing

use crate::engine::ScalingDecision;
use crate::models::WorkloadKey;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for tick durations (in seconds)
const TICK_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AutoscalerMetricsInner> = OnceLock::new();

struct AutoscalerMetricsInner {
    tick_duration_seconds: Histogram,
    policies_active: IntGauge,
    scale_events: IntCounterVec,
    scale_failures: IntCounter,
    sample_failures: IntCounter,
    workload_cpu_average: GaugeVec,
}

impl AutoscalerMetricsInner {
    fn new() -> Self {
        Self {
            tick_duration_seconds: register_histogram!(
                "autoscaler_tick_duration_seconds",
                "Time spent evaluating all policies in one scheduler tick",
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_duration_seconds"),

            policies_active: register_int_gauge!(
                "autoscaler_policies_active",
                "Number of scaling policies currently registered"
            )
            .expect("Failed to register policies_active"),

            scale_events: register_int_counter_vec!(
                "autoscaler_scale_events_total",
                "Replica changes requested by the autoscaler",
                &["direction"]
            )
            .expect("Failed to register scale_events"),

            scale_failures: register_int_counter!(
                "autoscaler_scale_failures_total",
                "Replica changes rejected by the orchestration API"
            )
            .expect("Failed to register scale_failures"),

            sample_failures: register_int_counter!(
                "autoscaler_sample_failures_total",
                "Workload evaluations abandoned before a decision"
            )
            .expect("Failed to register sample_failures"),

            workload_cpu_average: register_gauge_vec!(
                "autoscaler_workload_cpu_average_percent",
                "Smoothed CPU utilization per workload",
                &["namespace", "deployment"]
            )
            .expect("Failed to register workload_cpu_average"),
        }
    }
}

/// Autoscaler metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AutoscalerMetrics {
    _private: (),
}

impl Default for AutoscalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoscalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AutoscalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AutoscalerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_tick_duration(&self, duration_secs: f64) {
        self.inner().tick_duration_seconds.observe(duration_secs);
    }

    pub fn set_policies_active(&self, count: i64) {
        self.inner().policies_active.set(count);
    }

    pub fn inc_scale_event(&self, direction: &str) {
        self.inner()
            .scale_events
            .with_label_values(&[direction])
            .inc();
    }

    pub fn inc_scale_failures(&self) {
        self.inner().scale_failures.inc();
    }

    pub fn inc_sample_failures(&self) {
        self.inner().sample_failures.inc();
    }

    pub fn set_workload_cpu_average(&self, key: &WorkloadKey, percent: f64) {
        self.inner()
            .workload_cpu_average
            .with_label_values(&[&key.namespace, &key.name])
            .set(percent);
    }
}

/// Structured logger for autoscaler events
///
/// Emits one consistently shaped event per significant action so the
/// JSON log stream can be filtered on `event`.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, kube_api_url: &str) {
        info!(
            event = "controller_started",
            instance = %self.instance,
            version = %version,
            kube_api_url = %kube_api_url,
            "Starting autoscaler"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Autoscaler shutting down"
        );
    }

    pub fn log_policy_set(&self, key: &WorkloadKey, min_replicas: u32, max_replicas: u32) {
        info!(
            event = "policy_set",
            instance = %self.instance,
            workload = %key,
            min_replicas = min_replicas,
            max_replicas = max_replicas,
            "Set policy for deployment"
        );
    }

    pub fn log_scale(&self, key: &WorkloadKey, decision: &ScalingDecision, average_cpu: f64) {
        let (from, to) = match decision {
            ScalingDecision::ScaleUp { from, to } | ScalingDecision::ScaleDown { from, to } => {
                (*from, *to)
            }
            ScalingDecision::Hold(_) => return,
        };

        info!(
            event = "scaled",
            instance = %self.instance,
            workload = %key,
            direction = decision.direction(),
            from_replicas = from,
            to_replicas = to,
            average_cpu = average_cpu,
            "Scaled deployment"
        );
    }

    pub fn log_sample_aborted(&self, key: &WorkloadKey, no_data: bool, reason: &str) {
        if no_data {
            info!(
                event = "sample_aborted",
                instance = %self.instance,
                workload = %key,
                reason = %reason,
                "No data for deployment, skipping this cycle"
            );
        } else {
            warn!(
                event = "sample_aborted",
                instance = %self.instance,
                workload = %key,
                reason = %reason,
                "Error sampling deployment, skipping this cycle"
            );
        }
    }
}
