//! Shared policy and status bookkeeping
//!
//! Both maps sit behind one mutex. Callers only get copies out, or run a
//! closure against a status while the lock is held, so nothing can hold the
//! lock across a network call.

use crate::models::{DeploymentStatus, Policy, StatusReport, WorkloadKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct RegistryState {
    policies: HashMap<WorkloadKey, Policy>,
    statuses: HashMap<WorkloadKey, DeploymentStatus>,
}

/// Registry of active policies and per-workload runtime status
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a policy, replacing any existing one with the same key
    pub async fn set_policy(&self, policy: Policy) {
        let mut state = self.state.lock().await;
        let replaced = state.policies.insert(policy.key.clone(), policy).is_some();
        debug!(replaced = replaced, policies = state.policies.len(), "Policy stored");
    }

    pub async fn policy(&self, key: &WorkloadKey) -> Option<Policy> {
        self.state.lock().await.policies.get(key).cloned()
    }

    /// Copy of the current policy set, ordered by key
    pub async fn snapshot_policies(&self) -> Vec<Policy> {
        let state = self.state.lock().await;
        let mut policies: Vec<Policy> = state.policies.values().cloned().collect();
        policies.sort_by(|a, b| a.key.cmp(&b.key));
        policies
    }

    pub async fn policy_count(&self) -> usize {
        self.state.lock().await.policies.len()
    }

    /// Return the status for `key`, creating it if this is the first sample
    pub async fn get_or_create_status(
        &self,
        key: &WorkloadKey,
        initial_replicas: u32,
        now: DateTime<Utc>,
    ) -> DeploymentStatus {
        self.update_status(key, initial_replicas, now, |status| status.clone())
            .await
    }

    /// Run `f` against the status for `key` while holding the registry lock.
    ///
    /// The status is created first if it does not exist yet. `f` must not
    /// block; it is the read-modify-write point for history and cooldown.
    pub async fn update_status<R>(
        &self,
        key: &WorkloadKey,
        initial_replicas: u32,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut DeploymentStatus) -> R,
    ) -> R {
        let mut state = self.state.lock().await;
        let status = state.statuses.entry(key.clone()).or_insert_with(|| {
            debug!(workload = %key, replicas = initial_replicas, "Tracking new deployment");
            DeploymentStatus::new(key, initial_replicas, now)
        });
        f(status)
    }

    /// Run `f` against an existing status; returns None if the workload was never sampled
    pub async fn modify_existing<R>(
        &self,
        key: &WorkloadKey,
        f: impl FnOnce(&mut DeploymentStatus) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock().await;
        state.statuses.get_mut(key).map(f)
    }

    pub async fn status(&self, key: &WorkloadKey) -> Option<DeploymentStatus> {
        self.state.lock().await.statuses.get(key).cloned()
    }

    /// Copy of all statuses for read-only reporting, ordered by key
    pub async fn list_statuses(&self) -> Vec<StatusReport> {
        let state = self.state.lock().await;
        let mut reports: Vec<StatusReport> =
            state.statuses.values().map(DeploymentStatus::report).collect();
        reports.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        reports
    }
}
