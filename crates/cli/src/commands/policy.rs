//! Policy submission commands

use anyhow::{Context, Result};
use autoscaler_lib::models::{DeploymentRef, PolicyDescriptor, ScaleRuleDescriptor};
use std::path::Path;

use crate::client::{ApiClient, MessageResponse};
use crate::output::{print_success, print_warning, OutputFormat};

/// Flags of `hpactl policy set`
#[derive(Debug, Clone, clap::Args)]
pub struct PolicyArgs {
    /// Deployment name
    pub deployment: String,

    /// Deployment namespace (defaults to the configured namespace)
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Minimum number of replicas
    #[arg(long, default_value_t = 1)]
    pub min_replicas: u32,

    /// Maximum number of replicas
    #[arg(long, default_value_t = 5)]
    pub max_replicas: u32,

    /// Seconds to wait after a scaling action before the next one
    #[arg(long, default_value_t = 120)]
    pub stabilization_period: u64,

    /// Average CPU percentage above which to add a replica
    #[arg(long, default_value_t = 70.0)]
    pub scale_up_cpu: f64,

    /// Number of samples averaged for scaling decisions
    #[arg(long, default_value_t = 60)]
    pub scale_up_period: usize,

    /// Average CPU percentage below which to remove a replica
    #[arg(long, default_value_t = 30.0)]
    pub scale_down_cpu: f64,

    /// Accepted for symmetry; the scale-up window is used for both directions
    #[arg(long, default_value_t = 60)]
    pub scale_down_period: usize,
}

impl PolicyArgs {
    pub fn into_descriptor(self, namespace: String) -> PolicyDescriptor {
        PolicyDescriptor {
            deployment: DeploymentRef {
                name: self.deployment,
                namespace,
            },
            min_replicas: self.min_replicas,
            max_replicas: self.max_replicas,
            stabilization_period_seconds: self.stabilization_period,
            scale_up: ScaleRuleDescriptor {
                cpu_percentage: self.scale_up_cpu,
                period_seconds: self.scale_up_period,
            },
            scale_down: ScaleRuleDescriptor {
                cpu_percentage: self.scale_down_cpu,
                period_seconds: self.scale_down_period,
            },
        }
    }
}

/// Read a policy descriptor from a JSON file
pub fn read_descriptor(path: &Path) -> Result<PolicyDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse policy file {}", path.display()))
}

/// Validate locally, then submit the policy to the controller
pub async fn submit_policy(
    client: &ApiClient,
    descriptor: PolicyDescriptor,
    format: OutputFormat,
) -> Result<()> {
    descriptor
        .clone()
        .into_policy()
        .context("Policy rejected before submission")?;

    if descriptor.scale_down.cpu_percentage >= descriptor.scale_up.cpu_percentage {
        print_warning("Scale-down threshold is not below scale-up threshold");
    }

    let response: MessageResponse = client.post("policies", &descriptor).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Table => {
            print_success(&format!(
                "{} for {}/{} ({}-{} replicas)",
                response.message,
                descriptor.deployment.namespace,
                descriptor.deployment.name,
                descriptor.min_replicas,
                descriptor.max_replicas
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: PolicyArgs,
    }

    #[test]
    fn test_defaults_match_controller_defaults() {
        let cli = TestCli::parse_from(["hpactl", "nginx-deployment"]);
        let descriptor = cli.args.into_descriptor("default".to_string());

        let expected: PolicyDescriptor = serde_json::from_value(serde_json::json!({
            "deployment": {"name": "nginx-deployment", "namespace": "default"},
            "minReplicas": 1,
            "maxReplicas": 5,
            "stabilizationPeriodSeconds": 120,
            "scaleUp": {"cpuPercentage": 70, "periodSeconds": 60},
            "scaleDown": {"cpuPercentage": 30, "periodSeconds": 60}
        }))
        .unwrap();
        assert_eq!(descriptor, expected);
    }

    #[test]
    fn test_read_descriptor_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{
                "deployment": {"name": "web", "namespace": "shop"},
                "minReplicas": 2, "maxReplicas": 10, "stabilizationPeriodSeconds": 60,
                "scaleUp": {"cpuPercentage": 80, "periodSeconds": 5},
                "scaleDown": {"cpuPercentage": 20, "periodSeconds": 5}
            }"#,
        )
        .unwrap();

        let descriptor = read_descriptor(&path).unwrap();
        assert_eq!(descriptor.deployment.namespace, "shop");
        assert_eq!(descriptor.max_replicas, 10);
    }

    #[tokio::test]
    async fn test_invalid_policy_not_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/policies")
            .expect(0)
            .create_async()
            .await;

        let cli = TestCli::parse_from(["hpactl", "web", "--min-replicas", "6"]);
        let client = ApiClient::new(&server.url()).unwrap();
        let result = submit_policy(
            &client,
            cli.args.into_descriptor("default".to_string()),
            OutputFormat::Table,
        )
        .await;

        assert!(result.is_err());
        mock.assert_async().await;
    }
}
