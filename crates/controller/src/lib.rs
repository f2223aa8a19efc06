//! CPU autoscaler controller
//!
//! Wires the autoscaler library to the Kubernetes API and serves the
//! policy API alongside health and metrics endpoints.

pub mod api;
pub mod config;
