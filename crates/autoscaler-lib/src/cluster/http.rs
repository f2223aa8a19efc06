//! Kubernetes API client
//!
//! Talks plain HTTP to the API server, normally through `kubectl proxy`, so
//! authentication is left to the proxy.

use super::{
    CollaboratorResult, ContainerUsage, DeploymentSpec, MetricsSource, PodInfo, PodMetrics,
    Scaler, WorkloadDirectory,
};
use crate::error::CollaboratorError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Address of a local `kubectl proxy`
pub const DEFAULT_KUBE_API_URL: &str = "http://localhost:8001";

#[derive(Debug, Deserialize)]
struct DeploymentObject {
    spec: DeploymentObjectSpec,
}

#[derive(Debug, Deserialize)]
struct DeploymentObjectSpec {
    replicas: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodObject>,
}

#[derive(Debug, Deserialize)]
struct PodObject {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<ContainerSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerSpec {
    #[serde(default)]
    resources: ResourceRequirements,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceRequirements {
    #[serde(default)]
    limits: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PodMetricsObject {
    #[serde(default)]
    containers: Vec<ContainerMetricsObject>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetricsObject {
    #[serde(default)]
    name: String,
    #[serde(default)]
    usage: HashMap<String, String>,
}

/// Client for the deployments, pods, metrics and scale endpoints
#[derive(Debug, Clone)]
pub struct KubeApiClient {
    client: Client,
    base_url: Url,
}

impl KubeApiClient {
    /// Create a new client; `timeout` bounds every request
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid Kubernetes API URL")?;
        // Relative joins replace the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> CollaboratorResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CollaboratorError::Malformed {
                url: format!("{}{}", self.base_url, path),
                reason: e.to_string(),
            })
    }

    /// GET a JSON object; a 404 is reported as `Ok(None)`
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> CollaboratorResult<Option<T>> {
        let url = self.url(path)?;
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| CollaboratorError::Unreachable {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CollaboratorError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| CollaboratorError::Malformed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(body))
    }
}

#[async_trait]
impl WorkloadDirectory for KubeApiClient {
    async fn get_deployment(
        &self,
        name: &str,
        namespace: &str,
    ) -> CollaboratorResult<Option<DeploymentSpec>> {
        let path = format!("apis/apps/v1/namespaces/{}/deployments/{}", namespace, name);
        let Some(deployment) = self.get_json::<DeploymentObject>(&path).await? else {
            return Ok(None);
        };

        let replicas = deployment
            .spec
            .replicas
            .ok_or_else(|| CollaboratorError::Malformed {
                url: path.clone(),
                reason: "deployment spec has no replicas field".to_string(),
            })?;

        Ok(Some(DeploymentSpec { replicas }))
    }

    async fn list_pods(&self, namespace: &str) -> CollaboratorResult<Vec<PodInfo>> {
        let path = format!("api/v1/namespaces/{}/pods", namespace);
        let pods = self
            .get_json::<PodList>(&path)
            .await?
            .unwrap_or_default();

        Ok(pods
            .items
            .into_iter()
            .map(|pod| PodInfo {
                name: pod.metadata.name,
                container_cpu_limits: pod
                    .spec
                    .containers
                    .into_iter()
                    .map(|c| c.resources.limits.get("cpu").cloned())
                    .collect(),
            })
            .collect())
    }
}

#[async_trait]
impl MetricsSource for KubeApiClient {
    async fn get_pod_metrics(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> CollaboratorResult<Option<PodMetrics>> {
        let path = format!(
            "apis/metrics.k8s.io/v1beta1/namespaces/{}/pods/{}",
            namespace, pod_name
        );
        let metrics = self.get_json::<PodMetricsObject>(&path).await?;

        Ok(metrics.map(|m| PodMetrics {
            containers: m
                .containers
                .into_iter()
                .map(|c| ContainerUsage {
                    name: c.name,
                    cpu: c.usage.get("cpu").cloned(),
                })
                .collect(),
        }))
    }
}

#[async_trait]
impl Scaler for KubeApiClient {
    async fn set_replicas(
        &self,
        name: &str,
        namespace: &str,
        replicas: u32,
    ) -> CollaboratorResult<()> {
        let path = format!(
            "apis/apps/v1/namespaces/{}/deployments/{}/scale",
            namespace, name
        );
        let url = self.url(&path)?;
        let scale = json!({
            "apiVersion": "autoscaling/v1",
            "kind": "Scale",
            "metadata": { "name": name, "namespace": namespace },
            "spec": { "replicas": replicas },
        });

        debug!(url = %url, replicas = replicas, "PUT scale");

        let response = self
            .client
            .put(url.clone())
            .json(&scale)
            .send()
            .await
            .map_err(|source| CollaboratorError::Unreachable {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard) -> KubeApiClient {
        KubeApiClient::new(&server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_get_deployment_reads_replicas() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/apis/apps/v1/namespaces/default/deployments/web")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"metadata":{"name":"web"},"spec":{"replicas":3}}"#)
            .create_async()
            .await;

        let spec = client(&server)
            .get_deployment("web", "default")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(spec, Some(DeploymentSpec { replicas: 3 }));
    }

    #[tokio::test]
    async fn test_get_deployment_not_found_is_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/apis/apps/v1/namespaces/default/deployments/missing")
            .with_status(404)
            .create_async()
            .await;

        let spec = client(&server)
            .get_deployment("missing", "default")
            .await
            .unwrap();

        assert!(spec.is_none());
    }

    #[tokio::test]
    async fn test_get_deployment_server_error_is_unreachable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/apis/apps/v1/namespaces/default/deployments/web")
            .with_status(500)
            .create_async()
            .await;

        let err = client(&server)
            .get_deployment("web", "default")
            .await
            .unwrap_err();

        assert!(err.is_unreachable());
        assert!(matches!(err, CollaboratorError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_get_deployment_without_replicas_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/apis/apps/v1/namespaces/default/deployments/web")
            .with_status(200)
            .with_body(r#"{"spec":{}}"#)
            .create_async()
            .await;

        let err = client(&server)
            .get_deployment("web", "default")
            .await
            .unwrap_err();

        assert!(matches!(err, CollaboratorError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_list_pods_extracts_cpu_limits() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/namespaces/default/pods")
            .with_status(200)
            .with_body(
                r#"{"items":[
                    {"metadata":{"name":"web-abc"},"spec":{"containers":[
                        {"name":"app","resources":{"limits":{"cpu":"500m","memory":"128Mi"}}},
                        {"name":"sidecar"}
                    ]}},
                    {"metadata":{"name":"db-0"},"spec":{"containers":[{"name":"pg"}]}}
                ]}"#,
            )
            .create_async()
            .await;

        let pods = client(&server).list_pods("default").await.unwrap();

        assert_eq!(pods.len(), 2);
        assert_eq!(pods[0].name, "web-abc");
        assert_eq!(
            pods[0].container_cpu_limits,
            vec![Some("500m".to_string()), None]
        );
        assert_eq!(pods[1].container_cpu_limits, vec![None]);
    }

    #[tokio::test]
    async fn test_get_pod_metrics() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "GET",
                "/apis/metrics.k8s.io/v1beta1/namespaces/default/pods/web-abc",
            )
            .with_status(200)
            .with_body(
                r#"{"metadata":{"name":"web-abc"},"containers":[
                    {"name":"app","usage":{"cpu":"250000000n","memory":"10Mi"}}
                ]}"#,
            )
            .create_async()
            .await;

        let metrics = client(&server)
            .get_pod_metrics("default", "web-abc")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(metrics.containers.len(), 1);
        assert_eq!(metrics.containers[0].cpu.as_deref(), Some("250000000n"));
    }

    #[tokio::test]
    async fn test_set_replicas_puts_scale_subresource() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/apis/apps/v1/namespaces/default/deployments/web/scale")
            .match_body(Matcher::PartialJson(json!({"spec": {"replicas": 4}})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client(&server)
            .set_replicas("web", "default", 4)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_replicas_conflict_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/apis/apps/v1/namespaces/default/deployments/web/scale")
            .with_status(409)
            .create_async()
            .await;

        let err = client(&server)
            .set_replicas("web", "default", 4)
            .await
            .unwrap_err();

        assert!(matches!(err, CollaboratorError::Status { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_base_url_path_prefix_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/k8s/apis/apps/v1/namespaces/default/deployments/web")
            .with_status(200)
            .with_body(r#"{"spec":{"replicas":2}}"#)
            .create_async()
            .await;

        let client =
            KubeApiClient::new(&format!("{}/k8s", server.url()), Duration::from_secs(5)).unwrap();
        let spec = client.get_deployment("web", "default").await.unwrap();

        mock.assert_async().await;
        assert_eq!(spec, Some(DeploymentSpec { replicas: 2 }));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(KubeApiClient::new("not a url", Duration::from_secs(1)).is_err());
    }
}
