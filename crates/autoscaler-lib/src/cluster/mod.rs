//! Collaborators consumed by the control loop
//!
//! The core reads deployments and pods from a [`WorkloadDirectory`], pod CPU
//! usage from a [`MetricsSource`] and applies replica changes through a
//! [`Scaler`]. [`KubeApiClient`] implements all three against the Kubernetes
//! API server.

mod http;
mod quantity;

pub use http::{KubeApiClient, DEFAULT_KUBE_API_URL};
pub use quantity::{parse_cpu_quantity, InvalidQuantity};

use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// The part of a deployment spec the autoscaler reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub replicas: u32,
}

/// A pod as listed from the workload directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    /// CPU limit quantity per container, in container order
    pub container_cpu_limits: Vec<Option<String>>,
}

impl PodInfo {
    /// CPU limit of the first container in cores, if declared and parseable
    pub fn cpu_limit_cores(&self) -> Option<f64> {
        let limit = self.container_cpu_limits.first()?.as_deref()?;
        parse_cpu_quantity(limit).ok()
    }
}

/// Usage record for one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    /// CPU usage rate as a Kubernetes quantity, e.g. `250000000n`
    pub cpu: Option<String>,
}

/// Metrics for one pod, as reported by the metrics API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodMetrics {
    pub containers: Vec<ContainerUsage>,
}

/// Read access to deployments and pods
#[async_trait]
pub trait WorkloadDirectory: Send + Sync {
    /// Fetch a deployment's spec; `Ok(None)` when it does not exist
    async fn get_deployment(
        &self,
        name: &str,
        namespace: &str,
    ) -> CollaboratorResult<Option<DeploymentSpec>>;

    /// List every pod in a namespace
    async fn list_pods(&self, namespace: &str) -> CollaboratorResult<Vec<PodInfo>>;
}

/// Per-pod CPU usage
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch metrics for one pod; `Ok(None)` when no metrics are available
    async fn get_pod_metrics(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> CollaboratorResult<Option<PodMetrics>>;
}

/// Applies replica count changes
#[async_trait]
pub trait Scaler: Send + Sync {
    async fn set_replicas(&self, name: &str, namespace: &str, replicas: u32)
        -> CollaboratorResult<()>;
}
