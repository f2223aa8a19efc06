//! Scaling decisions
//!
//! [`decide`] is the pure threshold and cooldown logic. [`DecisionEngine`]
//! runs it under the registry lock, then applies the result through the
//! [`Scaler`] without holding the lock.

use crate::cluster::Scaler;
use crate::error::EvaluationError;
use crate::models::{DeploymentStatus, Policy};
use crate::observability::StructuredLogger;
use crate::registry::StatusRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Why an evaluation did not scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// The stabilization period has not elapsed since the last scale action
    Cooldown,
    /// Utilization is above the up threshold but the workload is at max replicas
    AtMaxReplicas,
    /// Utilization is below the down threshold but the workload is at min replicas
    AtMinReplicas,
    /// Utilization sits between the two thresholds
    WithinThresholds,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    ScaleUp { from: u32, to: u32 },
    ScaleDown { from: u32, to: u32 },
    Hold(HoldReason),
}

impl ScalingDecision {
    /// Replica count to request, if this decision scales
    pub fn target_replicas(&self) -> Option<u32> {
        match self {
            ScalingDecision::ScaleUp { to, .. } | ScalingDecision::ScaleDown { to, .. } => {
                Some(*to)
            }
            ScalingDecision::Hold(_) => None,
        }
    }

    pub fn direction(&self) -> &'static str {
        match self {
            ScalingDecision::ScaleUp { .. } => "up",
            ScalingDecision::ScaleDown { .. } => "down",
            ScalingDecision::Hold(_) => "none",
        }
    }
}

/// Decision plus the smoothed utilization it was based on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub average_utilization: f64,
    pub decision: ScalingDecision,
}

/// Record a sample in `status` and decide what to do.
///
/// Appends `utilization_percent` to the history (bounded by the up-rule
/// window), records the observed replica count and applies the cooldown and
/// threshold rules. Does not touch `last_scaled_at`.
pub fn decide(
    policy: &Policy,
    status: &mut DeploymentStatus,
    current_replicas: u32,
    utilization_percent: f64,
    now: DateTime<Utc>,
) -> Evaluation {
    status.current_replicas = current_replicas;
    status.record_sample(utilization_percent, policy.history_window());
    let average = status.average_utilization();

    let up = policy.scale_up.cpu_threshold_percent;
    let down = policy.scale_down.cpu_threshold_percent;

    let decision = if !status.cooldown_elapsed(policy.stabilization_period, now) {
        ScalingDecision::Hold(HoldReason::Cooldown)
    } else if average > up && current_replicas < policy.max_replicas {
        ScalingDecision::ScaleUp {
            from: current_replicas,
            to: current_replicas + 1,
        }
    } else if average < down && current_replicas > policy.min_replicas {
        ScalingDecision::ScaleDown {
            from: current_replicas,
            to: current_replicas - 1,
        }
    } else if average > up {
        ScalingDecision::Hold(HoldReason::AtMaxReplicas)
    } else if average < down {
        ScalingDecision::Hold(HoldReason::AtMinReplicas)
    } else {
        ScalingDecision::Hold(HoldReason::WithinThresholds)
    };

    Evaluation {
        average_utilization: average,
        decision,
    }
}

/// Applies scaling decisions for sampled workloads
#[derive(Clone)]
pub struct DecisionEngine {
    registry: StatusRegistry,
    scaler: Arc<dyn Scaler>,
    logger: StructuredLogger,
}

impl DecisionEngine {
    pub fn new(
        registry: StatusRegistry,
        scaler: Arc<dyn Scaler>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            registry,
            scaler,
            logger,
        }
    }

    /// Evaluate one workload with a fresh sample and scale it if needed.
    ///
    /// The cooldown is claimed under the lock before the scaler is called,
    /// so a concurrent evaluation of the same workload sees it. If the scaler
    /// fails the previous `last_scaled_at` is restored.
    pub async fn evaluate(
        &self,
        policy: &Policy,
        current_replicas: u32,
        utilization_percent: f64,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, EvaluationError> {
        let key = &policy.key;

        let (evaluation, previous_scaled_at) = self
            .registry
            .update_status(key, current_replicas, now, |status| {
                let evaluation = decide(policy, status, current_replicas, utilization_percent, now);
                let previous = status.last_scaled_at;
                if evaluation.decision.target_replicas().is_some() {
                    status.last_scaled_at = now;
                }
                (evaluation, previous)
            })
            .await;

        let Some(target) = evaluation.decision.target_replicas() else {
            debug!(
                workload = %key,
                average_cpu = evaluation.average_utilization,
                decision = ?evaluation.decision,
                "No scaling action"
            );
            return Ok(evaluation);
        };

        match self
            .scaler
            .set_replicas(&key.name, &key.namespace, target)
            .await
        {
            Ok(()) => {
                self.registry
                    .modify_existing(key, |status| status.current_replicas = target)
                    .await;
                self.logger
                    .log_scale(key, &evaluation.decision, evaluation.average_utilization);
                Ok(evaluation)
            }
            Err(source) => {
                self.registry
                    .modify_existing(key, |status| {
                        if status.last_scaled_at == now {
                            status.last_scaled_at = previous_scaled_at;
                        }
                    })
                    .await;
                Err(EvaluationError::Scale {
                    workload: key.clone(),
                    replicas: target,
                    source,
                })
            }
        }
    }
}
