//! Core data models for the autoscaler

use crate::error::PolicyError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Identity of a scaled workload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadKey {
    pub namespace: String,
    pub name: String,
}

impl WorkloadKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One direction of a scaling policy
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleRule {
    /// Average utilization (percent) that triggers the rule
    pub cpu_threshold_percent: f64,
    /// Number of samples retained for averaging
    pub window_size: usize,
}

/// Scaling configuration for one workload
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub key: WorkloadKey,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub stabilization_period: Duration,
    pub scale_up: ScaleRule,
    pub scale_down: ScaleRule,
}

impl Policy {
    /// Maximum history length kept for this workload.
    ///
    /// The up-rule's window bounds the single shared history, so the
    /// down-rule's window is accepted but never consulted.
    pub fn history_window(&self) -> usize {
        self.scale_up.window_size
    }
}

/// Runtime state tracked for each sampled workload
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentStatus {
    pub name: String,
    pub namespace: String,
    /// Last observed (or last successfully requested) replica count
    pub current_replicas: u32,
    pub last_scaled_at: DateTime<Utc>,
    pub cpu_usage_history: VecDeque<f64>,
}

impl DeploymentStatus {
    pub fn new(key: &WorkloadKey, current_replicas: u32, now: DateTime<Utc>) -> Self {
        Self {
            name: key.name.clone(),
            namespace: key.namespace.clone(),
            current_replicas,
            last_scaled_at: now,
            cpu_usage_history: VecDeque::new(),
        }
    }

    pub fn key(&self) -> WorkloadKey {
        WorkloadKey::new(&self.namespace, &self.name)
    }

    /// Append a sample, evicting the oldest entries beyond `window`
    pub fn record_sample(&mut self, utilization_percent: f64, window: usize) {
        self.cpu_usage_history.push_back(utilization_percent);
        while self.cpu_usage_history.len() > window {
            self.cpu_usage_history.pop_front();
        }
    }

    /// Mean of the retained samples, 0 when there are none
    pub fn average_utilization(&self) -> f64 {
        if self.cpu_usage_history.is_empty() {
            return 0.0;
        }
        self.cpu_usage_history.iter().sum::<f64>() / self.cpu_usage_history.len() as f64
    }

    /// Whether the stabilization period has passed since the last scale action
    pub fn cooldown_elapsed(&self, stabilization_period: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_scaled_at >= stabilization_period
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            current_replicas: self.current_replicas,
            current_cpu_average: self.average_utilization(),
        }
    }
}

/// Point-in-time view of one workload for observability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub name: String,
    pub namespace: String,
    pub current_replicas: u32,
    pub current_cpu_average: f64,
}

/// Workload reference inside a policy submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRef {
    pub name: String,
    pub namespace: String,
}

/// Wire form of a scale rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRuleDescriptor {
    pub cpu_percentage: f64,
    /// History window length, counted in samples
    pub period_seconds: usize,
}

/// Policy submission payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDescriptor {
    pub deployment: DeploymentRef,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub stabilization_period_seconds: u64,
    pub scale_up: ScaleRuleDescriptor,
    pub scale_down: ScaleRuleDescriptor,
}

impl PolicyDescriptor {
    /// Validate the submission and convert it into a [`Policy`]
    pub fn into_policy(self) -> Result<Policy, PolicyError> {
        if self.deployment.name.trim().is_empty() {
            return Err(PolicyError::EmptyName);
        }
        if self.deployment.namespace.trim().is_empty() {
            return Err(PolicyError::EmptyNamespace);
        }
        if self.min_replicas == 0 {
            return Err(PolicyError::MinReplicasTooLow(self.min_replicas));
        }
        if self.min_replicas > self.max_replicas {
            return Err(PolicyError::InvertedBounds {
                min: self.min_replicas,
                max: self.max_replicas,
            });
        }
        if self.scale_up.period_seconds == 0 {
            return Err(PolicyError::EmptyWindow);
        }
        for (rule, value) in [
            ("scaleUp", self.scale_up.cpu_percentage),
            ("scaleDown", self.scale_down.cpu_percentage),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PolicyError::InvalidThreshold { rule, value });
            }
        }

        let stabilization_secs =
            i64::try_from(self.stabilization_period_seconds).unwrap_or(i64::MAX);

        Ok(Policy {
            key: WorkloadKey::new(self.deployment.namespace, self.deployment.name),
            min_replicas: self.min_replicas,
            max_replicas: self.max_replicas,
            stabilization_period: Duration::try_seconds(stabilization_secs)
                .unwrap_or(Duration::MAX),
            scale_up: ScaleRule {
                cpu_threshold_percent: self.scale_up.cpu_percentage,
                window_size: self.scale_up.period_seconds,
            },
            scale_down: ScaleRule {
                cpu_threshold_percent: self.scale_down.cpu_percentage,
                window_size: self.scale_down.period_seconds,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> PolicyDescriptor {
        PolicyDescriptor {
            deployment: DeploymentRef {
                name: "nginx-deployment".to_string(),
                namespace: "default".to_string(),
            },
            min_replicas: 1,
            max_replicas: 5,
            stabilization_period_seconds: 120,
            scale_up: ScaleRuleDescriptor {
                cpu_percentage: 70.0,
                period_seconds: 3,
            },
            scale_down: ScaleRuleDescriptor {
                cpu_percentage: 30.0,
                period_seconds: 5,
            },
        }
    }

    #[test]
    fn test_average_of_empty_history_is_zero() {
        let status = DeploymentStatus::new(&WorkloadKey::new("default", "web"), 2, Utc::now());
        assert_eq!(status.average_utilization(), 0.0);
    }

    #[test]
    fn test_record_sample_evicts_oldest_first() {
        let mut status = DeploymentStatus::new(&WorkloadKey::new("default", "web"), 2, Utc::now());
        for sample in [10.0, 20.0, 30.0, 40.0] {
            status.record_sample(sample, 3);
            assert!(status.cpu_usage_history.len() <= 3);
        }

        assert_eq!(
            status.cpu_usage_history.iter().copied().collect::<Vec<_>>(),
            vec![20.0, 30.0, 40.0]
        );
        assert_eq!(status.average_utilization(), 30.0);
    }

    #[test]
    fn test_record_sample_shrinks_to_smaller_window() {
        let mut status = DeploymentStatus::new(&WorkloadKey::new("default", "web"), 2, Utc::now());
        for sample in [1.0, 2.0, 3.0, 4.0, 5.0] {
            status.record_sample(sample, 5);
        }
        status.record_sample(6.0, 2);

        assert_eq!(
            status.cpu_usage_history.iter().copied().collect::<Vec<_>>(),
            vec![5.0, 6.0]
        );
    }

    #[test]
    fn test_cooldown_boundary_is_inclusive() {
        let now = Utc::now();
        let mut status = DeploymentStatus::new(&WorkloadKey::new("default", "web"), 2, now);
        status.last_scaled_at = now - Duration::seconds(120);

        assert!(status.cooldown_elapsed(Duration::seconds(120), now));
        assert!(!status.cooldown_elapsed(Duration::seconds(121), now));
    }

    #[test]
    fn test_descriptor_deserializes_camel_case() {
        let json = r#"{
            "deployment": {"name": "nginx-deployment", "namespace": "default"},
            "minReplicas": 1,
            "maxReplicas": 5,
            "stabilizationPeriodSeconds": 120,
            "scaleUp": {"cpuPercentage": 70, "periodSeconds": 3},
            "scaleDown": {"cpuPercentage": 30, "periodSeconds": 5}
        }"#;

        let parsed: PolicyDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, descriptor());
    }

    #[test]
    fn test_into_policy_maps_fields() {
        let policy = descriptor().into_policy().unwrap();

        assert_eq!(policy.key, WorkloadKey::new("default", "nginx-deployment"));
        assert_eq!(policy.stabilization_period, Duration::seconds(120));
        assert_eq!(policy.scale_up.window_size, 3);
        assert_eq!(policy.scale_down.window_size, 5);
        // History is bounded by the up-rule window only
        assert_eq!(policy.history_window(), 3);
    }

    #[test]
    fn test_into_policy_rejects_invalid_bounds() {
        let mut zero_min = descriptor();
        zero_min.min_replicas = 0;
        assert_eq!(
            zero_min.into_policy().unwrap_err(),
            PolicyError::MinReplicasTooLow(0)
        );

        let mut inverted = descriptor();
        inverted.min_replicas = 6;
        assert_eq!(
            inverted.into_policy().unwrap_err(),
            PolicyError::InvertedBounds { min: 6, max: 5 }
        );

        let mut no_window = descriptor();
        no_window.scale_up.period_seconds = 0;
        assert_eq!(no_window.into_policy().unwrap_err(), PolicyError::EmptyWindow);

        let mut unnamed = descriptor();
        unnamed.deployment.name = " ".to_string();
        assert_eq!(unnamed.into_policy().unwrap_err(), PolicyError::EmptyName);
    }

    #[test]
    fn test_into_policy_allows_overlapping_thresholds() {
        let mut overlapping = descriptor();
        overlapping.scale_down.cpu_percentage = 90.0;

        assert!(overlapping.into_policy().is_ok());
    }

    #[test]
    fn test_workload_key_display() {
        assert_eq!(WorkloadKey::new("prod", "api").to_string(), "prod/api");
    }
}
