//! Controller configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Instance name used in structured log events
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Port for the policy API, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Kubernetes API base URL, usually a local `kubectl proxy`
    #[serde(default = "default_kube_api_url")]
    pub kube_api_url: String,

    /// Pause between scheduler ticks in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Maximum random delay added to each pause, in milliseconds
    #[serde(default)]
    pub tick_jitter_ms: u64,

    /// Timeout for each Kubernetes API request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "autoscaler".to_string())
}

fn default_api_port() -> u16 {
    5000
}

fn default_kube_api_url() -> String {
    autoscaler_lib::cluster::DEFAULT_KUBE_API_URL.to_string()
}

fn default_tick_interval() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    10
}

impl ControllerConfig {
    /// Load configuration from `AUTOSCALER_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AUTOSCALER").try_parsing(true))
            .build()
            .context("Failed to read autoscaler configuration")?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("Invalid autoscaler configuration")?;

        if parsed.tick_interval_secs == 0 {
            anyhow::bail!("tick_interval_secs must be at least 1");
        }

        Ok(parsed)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn tick_jitter(&self) -> Duration {
        Duration::from_millis(self.tick_jitter_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
