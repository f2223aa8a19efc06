//! Autoscaler library for CPU-driven horizontal scaling
//!
//! This crate provides the core functionality for:
//! - Scaling policies and per-workload status tracking
//! - CPU sampling through the Kubernetes API and metrics server
//! - Threshold and cooldown based scaling decisions
//! - The periodic scheduler loop
//! - Health checks and observability

pub mod cluster;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod registry;
pub mod sampler;
pub mod scheduler;

pub use engine::{DecisionEngine, Evaluation, HoldReason, ScalingDecision};
pub use error::{CollaboratorError, EvaluationError, PolicyError, SampleError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AutoscalerMetrics, StructuredLogger};
pub use registry::StatusRegistry;
pub use sampler::{Sample, Sampler};
pub use scheduler::{SchedulerConfig, SchedulerLoop, SchedulerLoopBuilder, TickSummary};
