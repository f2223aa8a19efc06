//! CLI subcommands

pub mod deployments;
pub mod policy;
