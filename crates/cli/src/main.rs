//! CPU Autoscaler CLI
//!
//! A command-line tool for submitting scaling policies to the autoscaler
//! controller and inspecting the deployments it tracks.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{deployments, policy};
use std::path::PathBuf;

/// CPU Autoscaler CLI
#[derive(Parser)]
#[command(name = "hpactl")]
#[command(author, version, about = "CLI for the CPU Autoscaler", long_about = None)]
pub struct Cli {
    /// Controller URL (can also be set via AUTOSCALER_URL env var)
    #[arg(long, env = "AUTOSCALER_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage scaling policies
    #[command(subcommand)]
    Policy(PolicyCommands),

    /// Show autoscaler state
    #[command(subcommand)]
    Get(GetCommands),
}

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Create or replace the policy for a deployment
    Set(policy::PolicyArgs),

    /// Submit a policy from a JSON file
    Apply {
        /// Path to the policy file
        #[arg(long, short = 'f')]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum GetCommands {
    /// List tracked deployments with their replicas and CPU average
    Deployments {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    // Initialize client
    let client = client::ApiClient::new(&config.api_url(cli.api_url))?;

    // Execute command
    match cli.command {
        Commands::Policy(policy_cmd) => match policy_cmd {
            PolicyCommands::Set(args) => {
                let namespace = config.namespace(args.namespace.clone());
                policy::submit_policy(&client, args.into_descriptor(namespace), cli.format).await?;
            }
            PolicyCommands::Apply { file } => {
                let descriptor = policy::read_descriptor(&file)?;
                policy::submit_policy(&client, descriptor, cli.format).await?;
            }
        },
        Commands::Get(get_cmd) => match get_cmd {
            GetCommands::Deployments { namespace } => {
                deployments::get_deployments(&client, namespace, cli.format).await?;
            }
        },
    }

    Ok(())
}
