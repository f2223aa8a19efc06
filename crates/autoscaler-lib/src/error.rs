//! Error types for the autoscaler core
//!
//! Collaborator failures, sampling aborts and policy validation failures are
//! kept apart so the scheduler can log each class differently. None of them
//! is fatal to the control loop.

use crate::models::WorkloadKey;
use thiserror::Error;

/// Failure talking to the Workload Directory, Metrics Source or Scaler
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Network failure or timeout
    #[error("request to {url} failed: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Response body did not have the expected shape
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl CollaboratorError {
    /// True for transport-level failures (unreachable or non-2xx)
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unreachable { .. } | CollaboratorError::Status { .. }
        )
    }
}

/// Reasons a sampling cycle for one workload was abandoned
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("deployment {0} not found")]
    DeploymentNotFound(WorkloadKey),

    #[error("no pods matched deployment {0}")]
    NoPods(WorkloadKey),

    #[error("no usable pod metrics for deployment {0}")]
    NoUsableMetrics(WorkloadKey),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl SampleError {
    /// True when the cycle aborted because there was nothing to measure
    pub fn is_no_data(&self) -> bool {
        matches!(
            self,
            SampleError::DeploymentNotFound(_)
                | SampleError::NoPods(_)
                | SampleError::NoUsableMetrics(_)
        )
    }
}

/// Failure while evaluating one workload inside a scheduler tick
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("sampling failed: {0}")]
    Sample(#[from] SampleError),

    #[error("scaling {workload} to {replicas} replicas failed: {source}")]
    Scale {
        workload: WorkloadKey,
        replicas: u32,
        #[source]
        source: CollaboratorError,
    },
}

/// Rejection of a submitted policy descriptor
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("deployment name must not be empty")]
    EmptyName,

    #[error("deployment namespace must not be empty")]
    EmptyNamespace,

    #[error("minReplicas must be at least 1, got {0}")]
    MinReplicasTooLow(u32),

    #[error("minReplicas ({min}) must not exceed maxReplicas ({max})")]
    InvertedBounds { min: u32, max: u32 },

    #[error("scaleUp.periodSeconds must be at least 1")]
    EmptyWindow,

    #[error("{rule}.cpuPercentage must be a finite, non-negative number, got {value}")]
    InvalidThreshold { rule: &'static str, value: f64 },
}
