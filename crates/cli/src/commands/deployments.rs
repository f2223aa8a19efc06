//! Deployment status commands

use anyhow::Result;
use autoscaler_lib::models::StatusReport;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_utilization, print_warning, OutputFormat};

/// Row for the deployments table
#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Deployment")]
    name: String,
    #[tabled(rename = "Replicas")]
    replicas: u32,
    #[tabled(rename = "CPU Avg")]
    cpu_average: String,
}

/// Keep only the reports in `namespace`, or all of them
pub fn filter_namespace(reports: Vec<StatusReport>, namespace: Option<&str>) -> Vec<StatusReport> {
    match namespace {
        Some(ns) => reports.into_iter().filter(|r| r.namespace == ns).collect(),
        None => reports,
    }
}

/// List the deployments the autoscaler is tracking
pub async fn get_deployments(
    client: &ApiClient,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let reports: Vec<StatusReport> = client.get("deployments").await?;
    let filtered = filter_namespace(reports, namespace.as_deref());

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&filtered)?);
        }
        OutputFormat::Table => {
            if filtered.is_empty() {
                print_warning("No deployments tracked yet");
                return Ok(());
            }

            let rows: Vec<DeploymentRow> = filtered
                .iter()
                .map(|r| DeploymentRow {
                    namespace: r.namespace.clone(),
                    name: r.name.clone(),
                    replicas: r.current_replicas,
                    cpu_average: color_utilization(r.current_cpu_average),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} deployments", filtered.len());
        }
    }

    Ok(())
}
