//! Autoscaler control loop
//!
//! Every tick takes a snapshot of the registered policies and, one workload
//! at a time, samples its CPU utilization and hands the result to the
//! decision engine. A failing or panicking workload is logged and the tick
//! moves on to the next one.


use crate::cluster::{MetricsSource, Scaler, WorkloadDirectory};
use crate::engine::{DecisionEngine, Evaluation, ScalingDecision};
use crate::error::{EvaluationError, SampleError};
use crate::health::{components, HealthRegistry};
use crate::models::Policy;
use crate::observability::{AutoscalerMetrics, StructuredLogger};
use crate::registry::StatusRegistry;
use crate::sampler::Sampler;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

/// Default period between ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the scheduler loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause after each completed tick (default: 10 seconds)
    pub interval: Duration,
    /// Maximum random delay added to each pause (default: none)
    pub jitter: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TICK_INTERVAL,
            jitter: Duration::ZERO,
        }
    }
}

/// Counts from one pass over all policies
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub evaluated: usize,
    pub scaled_up: usize,
    pub scaled_down: usize,
    pub held: usize,
    /// Workloads with nothing to measure this tick
    pub skipped: usize,
    /// Workloads whose evaluation errored or panicked
    pub failed: usize,
    /// Subset of `failed` caused by an unreachable collaborator
    pub unreachable: usize,
}

/// Periodic evaluator of every registered policy
pub struct SchedulerLoop {
    registry: StatusRegistry,
    sampler: Sampler,
    engine: DecisionEngine,
    config: SchedulerConfig,
    health: HealthRegistry,
    metrics: AutoscalerMetrics,
    logger: StructuredLogger,
}

impl SchedulerLoop {
    pub fn new(
        registry: StatusRegistry,
        sampler: Sampler,
        engine: DecisionEngine,
        config: SchedulerConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            registry,
            sampler,
            engine,
            config,
            health,
            metrics: AutoscalerMetrics::new(),
            logger,
        }
    }

    /// Run until `shutdown` fires. Ticks never overlap: the pause starts
    /// only after the previous tick has finished.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting autoscaler monitoring loop"
        );

        let mut tick_count = 0u64;

        loop {
            let summary = self.tick().await;
            tick_count += 1;

            debug!(
                tick = tick_count,
                evaluated = summary.evaluated,
                scaled_up = summary.scaled_up,
                scaled_down = summary.scaled_down,
                failed = summary.failed,
                "Tick complete"
            );

            tokio::select! {
                _ = sleep(self.current_interval()) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down autoscaler monitoring loop");
                    break;
                }
            }
        }
    }

    /// Run a single tick using the wall clock
    pub async fn tick(&self) -> TickSummary {
        self.run_tick(Utc::now).await
    }

    /// Run a single tick with every evaluation seeing `now`
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickSummary {
        self.run_tick(move || now).await
    }

    async fn run_tick(&self, clock: impl Fn() -> DateTime<Utc>) -> TickSummary {
        let start = Instant::now();
        let policies = self.registry.snapshot_policies().await;
        self.metrics.set_policies_active(policies.len() as i64);

        let mut summary = TickSummary::default();

        for policy in policies {
            let key = policy.key.clone();
            debug!(workload = %key, "Checking scale conditions for deployment");

            let task = tokio::spawn(evaluate_workload(
                self.sampler.clone(),
                self.engine.clone(),
                policy,
                clock(),
            ));

            summary.evaluated += 1;
            match task.await {
                Ok(Ok(evaluation)) => {
                    self.metrics
                        .set_workload_cpu_average(&key, evaluation.average_utilization);
                    match evaluation.decision {
                        ScalingDecision::ScaleUp { .. } => summary.scaled_up += 1,
                        ScalingDecision::ScaleDown { .. } => summary.scaled_down += 1,
                        ScalingDecision::Hold(_) => summary.held += 1,
                    }
                    if evaluation.decision.target_replicas().is_some() {
                        self.metrics.inc_scale_event(evaluation.decision.direction());
                    }
                }
                Ok(Err(EvaluationError::Sample(e))) => {
                    self.metrics.inc_sample_failures();
                    self.logger
                        .log_sample_aborted(&key, e.is_no_data(), &e.to_string());
                    if e.is_no_data() {
                        summary.skipped += 1;
                    } else {
                        summary.failed += 1;
                        if matches!(&e, SampleError::Collaborator(c) if c.is_unreachable()) {
                            summary.unreachable += 1;
                        }
                    }
                }
                Ok(Err(e @ EvaluationError::Scale { .. })) => {
                    self.metrics.inc_scale_failures();
                    error!(
                        workload = %key,
                        error = %e,
                        "Error updating replicas for deployment"
                    );
                    summary.failed += 1;
                    let unreachable = matches!(
                        &e,
                        EvaluationError::Scale { source, .. } if source.is_unreachable()
                    );
                    if unreachable {
                        summary.unreachable += 1;
                    }
                }
                Err(join_error) => {
                    error!(workload = %key, error = %join_error, "Error in scaling deployment");
                    summary.failed += 1;
                }
            }
        }

        self.metrics
            .observe_tick_duration(start.elapsed().as_secs_f64());
        self.report_health(&summary).await;

        summary
    }

    async fn report_health(&self, summary: &TickSummary) {
        self.health.set_healthy(components::SCHEDULER).await;

        if summary.unreachable == 0 {
            self.health.set_healthy(components::KUBE_API).await;
        } else {
            self.health
                .set_degraded(
                    components::KUBE_API,
                    format!(
                        "{} of {} workloads could not reach the Kubernetes API",
                        summary.unreachable, summary.evaluated
                    ),
                )
                .await;
        }
    }

    /// Pause before the next tick, including jitter
    fn current_interval(&self) -> Duration {
        let jitter_ms = clock_jitter(self.config.jitter.as_millis() as u64);
        self.config.interval + Duration::from_millis(jitter_ms)
    }
}

async fn evaluate_workload(
    sampler: Sampler,
    engine: DecisionEngine,
    policy: Policy,
    now: DateTime<Utc>,
) -> Result<Evaluation, EvaluationError> {
    let sample = sampler.sample(&policy.key).await?;
    debug!(
        workload = %policy.key,
        replicas = sample.current_replicas,
        utilization = sample.utilization_percent,
        pods = sample.pods_sampled,
        "Sampled deployment"
    );
    engine
        .evaluate(&policy, sample.current_replicas, sample.utilization_percent, now)
        .await
}

/// Jitter in `[0, max_ms)` taken from the sub-second part of the wall clock
fn clock_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;

    nanos % max_ms
}

/// Builder wiring the collaborators into a [`SchedulerLoop`]
pub struct SchedulerLoopBuilder {
    registry: Option<StatusRegistry>,
    directory: Option<Arc<dyn WorkloadDirectory>>,
    metrics_source: Option<Arc<dyn MetricsSource>>,
    scaler: Option<Arc<dyn Scaler>>,
    health: HealthRegistry,
    logger: StructuredLogger,
    config: SchedulerConfig,
}

impl SchedulerLoopBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            directory: None,
            metrics_source: None,
            scaler: None,
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("autoscaler"),
            config: SchedulerConfig::default(),
        }
    }

    pub fn registry(mut self, registry: StatusRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn WorkloadDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn metrics_source(mut self, metrics_source: Arc<dyn MetricsSource>) -> Self {
        self.metrics_source = Some(metrics_source);
        self
    }

    pub fn scaler(mut self, scaler: Arc<dyn Scaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<SchedulerLoop> {
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Status registry is required"))?;
        let directory = self
            .directory
            .ok_or_else(|| anyhow::anyhow!("Workload directory is required"))?;
        let metrics_source = self
            .metrics_source
            .ok_or_else(|| anyhow::anyhow!("Metrics source is required"))?;
        let scaler = self
            .scaler
            .ok_or_else(|| anyhow::anyhow!("Scaler is required"))?;

        let sampler = Sampler::new(directory, metrics_source);
        let engine = DecisionEngine::new(registry.clone(), scaler, self.logger.clone());

        Ok(SchedulerLoop::new(
            registry,
            sampler,
            engine,
            self.config,
            self.health,
            self.logger,
        ))
    }
}

impl Default for SchedulerLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
