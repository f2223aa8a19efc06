//! CPU utilization sampling
//!
//! Reduces the per-pod CPU usage of one workload to a single utilization
//! percentage. Utilization is reported as cores × 100 and is not divided by
//! the pod's CPU limit.

use crate::cluster::{parse_cpu_quantity, MetricsSource, PodInfo, PodMetrics, WorkloadDirectory};
use crate::error::SampleError;
use crate::models::WorkloadKey;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one sampling pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Replica count reported by the workload directory
    pub current_replicas: u32,
    /// Mean utilization across the sampled pods
    pub utilization_percent: f64,
    /// Number of pods that contributed a usage figure
    pub pods_sampled: usize,
}

/// Whether `pod` belongs to `workload`.
///
/// Ownership is approximated by name prefix, so `web` also claims pods of
/// `web-canary`.
pub fn pod_belongs_to_workload(pod: &PodInfo, workload: &WorkloadKey) -> bool {
    pod.name.starts_with(&workload.name)
}

/// CPU usage of the first container in cores.
///
/// A missing or unparseable usage record counts as zero.
pub fn first_container_cpu_cores(pod_name: &str, metrics: &PodMetrics) -> f64 {
    let Some(container) = metrics.containers.first() else {
        warn!(pod = %pod_name, "Pod metrics contain no containers, counting as 0");
        return 0.0;
    };

    let Some(quantity) = container.cpu.as_deref() else {
        warn!(
            pod = %pod_name,
            container = %container.name,
            "Container has no CPU usage, counting as 0"
        );
        return 0.0;
    };

    match parse_cpu_quantity(quantity) {
        Ok(cores) => cores,
        Err(e) => {
            warn!(pod = %pod_name, error = %e, "Error parsing CPU usage, counting as 0");
            0.0
        }
    }
}

/// Samples utilization for a workload from its collaborators
#[derive(Clone)]
pub struct Sampler {
    directory: Arc<dyn WorkloadDirectory>,
    metrics: Arc<dyn MetricsSource>,
}

impl Sampler {
    pub fn new(directory: Arc<dyn WorkloadDirectory>, metrics: Arc<dyn MetricsSource>) -> Self {
        Self { directory, metrics }
    }

    /// Sample the workload identified by `key`.
    ///
    /// Any error means the cycle for this workload should be abandoned
    /// without touching its status.
    pub async fn sample(&self, key: &WorkloadKey) -> Result<Sample, SampleError> {
        let deployment = self
            .directory
            .get_deployment(&key.name, &key.namespace)
            .await?
            .ok_or_else(|| SampleError::DeploymentNotFound(key.clone()))?;

        let pods = self.directory.list_pods(&key.namespace).await?;
        let owned: Vec<&PodInfo> = pods
            .iter()
            .filter(|pod| pod_belongs_to_workload(pod, key))
            .collect();

        if owned.is_empty() {
            return Err(SampleError::NoPods(key.clone()));
        }

        let mut usage_cores = Vec::with_capacity(owned.len());
        for pod in owned {
            let metrics = match self.metrics.get_pod_metrics(&key.namespace, &pod.name).await {
                Ok(Some(metrics)) => metrics,
                Ok(None) => {
                    debug!(workload = %key, pod = %pod.name, "No metrics for pod yet, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(
                        workload = %key,
                        pod = %pod.name,
                        error = %e,
                        "Error getting pod metrics, skipping"
                    );
                    continue;
                }
            };

            let cores = first_container_cpu_cores(&pod.name, &metrics);
            debug!(
                workload = %key,
                pod = %pod.name,
                cpu_cores = cores,
                cpu_limit_cores = ?pod.cpu_limit_cores(),
                "Pod CPU usage"
            );
            usage_cores.push(cores);
        }

        if usage_cores.is_empty() {
            return Err(SampleError::NoUsableMetrics(key.clone()));
        }

        let mean_cores = usage_cores.iter().sum::<f64>() / usage_cores.len() as f64;

        Ok(Sample {
            current_replicas: deployment.replicas,
            utilization_percent: mean_cores * 100.0,
            pods_sampled: usage_cores.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{CollaboratorResult, ContainerUsage, DeploymentSpec};
    use crate::error::CollaboratorError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Fake cluster serving fixed deployments, pods and metrics
    #[derive(Default)]
    struct FakeCluster {
        replicas: Option<u32>,
        pods: Vec<&'static str>,
        usage: HashMap<&'static str, Option<&'static str>>,
        failing_pods: Vec<&'static str>,
        directory_down: bool,
    }

    #[async_trait]
    impl WorkloadDirectory for FakeCluster {
        async fn get_deployment(
            &self,
            _name: &str,
            _namespace: &str,
        ) -> CollaboratorResult<Option<DeploymentSpec>> {
            if self.directory_down {
                return Err(CollaboratorError::Status {
                    url: "deployments".to_string(),
                    status: 503,
                });
            }
            Ok(self.replicas.map(|replicas| DeploymentSpec { replicas }))
        }

        async fn list_pods(&self, _namespace: &str) -> CollaboratorResult<Vec<PodInfo>> {
            Ok(self
                .pods
                .iter()
                .map(|name| PodInfo {
                    name: name.to_string(),
                    container_cpu_limits: vec![Some("1".to_string())],
                })
                .collect())
        }
    }

    #[async_trait]
    impl MetricsSource for FakeCluster {
        async fn get_pod_metrics(
            &self,
            _namespace: &str,
            pod_name: &str,
        ) -> CollaboratorResult<Option<PodMetrics>> {
            if self.failing_pods.iter().any(|p| *p == pod_name) {
                return Err(CollaboratorError::Status {
                    url: pod_name.to_string(),
                    status: 500,
                });
            }
            Ok(self.usage.get(pod_name).map(|cpu| PodMetrics {
                containers: vec![ContainerUsage {
                    name: "app".to_string(),
                    cpu: cpu.map(str::to_string),
                }],
            }))
        }
    }

    fn sampler(cluster: FakeCluster) -> Sampler {
        let cluster = Arc::new(cluster);
        Sampler::new(cluster.clone(), cluster)
    }

    fn web() -> WorkloadKey {
        WorkloadKey::new("default", "web")
    }

    #[test]
    fn test_prefix_ownership_includes_name_collisions() {
        let pod = |name: &str| PodInfo {
            name: name.to_string(),
            container_cpu_limits: vec![],
        };

        assert!(pod_belongs_to_workload(&pod("web-7d9f-abcde"), &web()));
        assert!(pod_belongs_to_workload(&pod("web-canary-1"), &web()));
        assert!(!pod_belongs_to_workload(&pod("api-1"), &web()));
        assert!(!pod_belongs_to_workload(&pod("my-web-1"), &web()));
    }

    #[tokio::test]
    async fn test_sample_averages_matching_pods_as_cores_times_100() {
        let sampler = sampler(FakeCluster {
            replicas: Some(2),
            pods: vec!["web-1", "web-2", "api-1"],
            usage: HashMap::from([
                ("web-1", Some("500000000n")),
                ("web-2", Some("700000000n")),
                ("api-1", Some("4")),
            ]),
            ..Default::default()
        });

        let sample = sampler.sample(&web()).await.unwrap();

        assert_eq!(sample.current_replicas, 2);
        assert_eq!(sample.pods_sampled, 2);
        assert!((sample.utilization_percent - 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sample_ignores_cpu_limit() {
        // Two cores against a one-core limit reads as 200, not 100
        let sampler = sampler(FakeCluster {
            replicas: Some(1),
            pods: vec!["web-1"],
            usage: HashMap::from([("web-1", Some("2"))]),
            ..Default::default()
        });

        let sample = sampler.sample(&web()).await.unwrap();
        assert_eq!(sample.utilization_percent, 200.0);
    }

    #[tokio::test]
    async fn test_sample_skips_pods_without_metrics() {
        let sampler = sampler(FakeCluster {
            replicas: Some(3),
            pods: vec!["web-1", "web-2", "web-3"],
            usage: HashMap::from([("web-1", Some("300m"))]),
            failing_pods: vec!["web-3"],
            ..Default::default()
        });

        let sample = sampler.sample(&web()).await.unwrap();

        assert_eq!(sample.pods_sampled, 1);
        assert!((sample.utilization_percent - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_malformed_usage_counts_as_zero() {
        let sampler = sampler(FakeCluster {
            replicas: Some(2),
            pods: vec!["web-1", "web-2"],
            usage: HashMap::from([("web-1", Some("800m")), ("web-2", Some("garbage"))]),
            ..Default::default()
        });

        let sample = sampler.sample(&web()).await.unwrap();

        assert_eq!(sample.pods_sampled, 2);
        assert!((sample.utilization_percent - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_usage_record_counts_as_zero() {
        let sampler = sampler(FakeCluster {
            replicas: Some(1),
            pods: vec!["web-1"],
            usage: HashMap::from([("web-1", None)]),
            ..Default::default()
        });

        let sample = sampler.sample(&web()).await.unwrap();
        assert_eq!(sample.utilization_percent, 0.0);
    }

    #[tokio::test]
    async fn test_no_matching_pods_aborts() {
        let sampler = sampler(FakeCluster {
            replicas: Some(1),
            pods: vec!["api-1"],
            usage: HashMap::from([("api-1", Some("1"))]),
            ..Default::default()
        });

        let err = sampler.sample(&web()).await.unwrap_err();
        assert!(matches!(err, SampleError::NoPods(_)));
        assert!(err.is_no_data());
    }

    #[tokio::test]
    async fn test_no_usable_metrics_aborts() {
        let sampler = sampler(FakeCluster {
            replicas: Some(1),
            pods: vec!["web-1"],
            ..Default::default()
        });

        let err = sampler.sample(&web()).await.unwrap_err();
        assert!(matches!(err, SampleError::NoUsableMetrics(_)));
    }

    #[tokio::test]
    async fn test_missing_deployment_aborts() {
        let sampler = sampler(FakeCluster {
            replicas: None,
            pods: vec!["web-1"],
            ..Default::default()
        });

        let err = sampler.sample(&web()).await.unwrap_err();
        assert!(matches!(err, SampleError::DeploymentNotFound(_)));
    }

    #[tokio::test]
    async fn test_unreachable_directory_aborts() {
        let sampler = sampler(FakeCluster {
            directory_down: true,
            ..Default::default()
        });

        let err = sampler.sample(&web()).await.unwrap_err();
        assert!(matches!(err, SampleError::Collaborator(ref e) if e.is_unreachable()));
        assert!(!err.is_no_data());
    }
}
