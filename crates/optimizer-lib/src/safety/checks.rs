//! Individual safety check implementations
//!
//! Each check queries live state and returns (passed, detail). A check that
//! cannot read the state it needs returns an error, which the manager
//! records as a failure; state unavailability never passes a gate.

use super::SafetyConfig;
use crate::cluster::{workload_selector, ClusterOps, PodPhase};
use crate::error::Result;
use crate::models::OptimizationAction;
use async_trait::async_trait;

/// Cluster-wide utilization and node count thresholds
pub(super) async fn cluster_health(
    cluster: &dyn ClusterOps,
    config: &SafetyConfig,
) -> Result<(bool, String)> {
    let metrics = cluster.get_cluster_metrics().await?;

    let cpu_ok = metrics.cpu_usage_percent < config.max_cluster_cpu_percent;
    let mem_ok = metrics.memory_usage_percent < config.max_cluster_memory_percent;
    let nodes_ok = metrics.node_count > 0;

    let passed = cpu_ok && mem_ok && nodes_ok;
    let detail = format!(
        "cpu {:.1}% (max {:.0}%), memory {:.1}% (max {:.0}%), {} nodes",
        metrics.cpu_usage_percent,
        config.max_cluster_cpu_percent,
        metrics.memory_usage_percent,
        config.max_cluster_memory_percent,
        metrics.node_count
    );
    Ok((passed, detail))
}

/// At least `min_running_pod_ratio` of the workload's pods must be Running
pub(super) async fn workload_health(
    cluster: &dyn ClusterOps,
    config: &SafetyConfig,
    action: &OptimizationAction,
) -> Result<(bool, String)> {
    let selector = workload_selector(&action.workload);
    let pods = cluster.list_pods(&action.namespace, &selector).await?;

    // 0 of 0 pods satisfies the ratio vacuously; a workload that is already
    // drained must not be gated out of an idempotent re-run.
    if pods.is_empty() {
        return Ok((
            true,
            format!("no pods for selector '{}', nothing to protect", selector),
        ));
    }

    let running = pods.iter().filter(|p| p.phase == PodPhase::Running).count();
    let ratio = running as f64 / pods.len() as f64;
    let passed = ratio >= config.min_running_pod_ratio;

    Ok((
        passed,
        format!(
            "{}/{} pods running ({:.0}% required)",
            running,
            pods.len(),
            config.min_running_pod_ratio * 100.0
        ),
    ))
}

/// Cluster must retain free headroom to absorb the mutation
pub(super) async fn resource_availability(
    cluster: &dyn ClusterOps,
    config: &SafetyConfig,
) -> Result<(bool, String)> {
    let metrics = cluster.get_cluster_metrics().await?;

    let cpu_ok = metrics.free_cpu_cores >= config.min_free_cpu_cores;
    let mem_ok = metrics.free_memory_bytes >= config.min_free_memory_bytes;

    Ok((
        cpu_ok && mem_ok,
        format!(
            "{:.2} free cores (need {:.2}), {}MB free memory (need {}MB)",
            metrics.free_cpu_cores,
            config.min_free_cpu_cores,
            metrics.free_memory_bytes / (1024 * 1024),
            config.min_free_memory_bytes / (1024 * 1024)
        ),
    ))
}

/// Snapshot current usage for later comparison; passes whenever metrics are
/// retrievable
pub(super) async fn performance_baseline(
    cluster: &dyn ClusterOps,
    action: &OptimizationAction,
) -> Result<(bool, String)> {
    let usage = cluster
        .get_pod_metrics(&action.workload, &action.namespace)
        .await?;

    Ok((
        true,
        format!(
            "baseline: {:.3} cores, {} bytes",
            usage.cpu_usage_cores, usage.memory_usage_bytes
        ),
    ))
}

/// Externally verifiable precondition the optimizer cannot evaluate itself
///
/// Backup and network verification run through these probes. The default
/// [`StubProbe`] passes but labels its result unverified; deployments
/// needing real gating inject their own implementation.
#[async_trait]
pub trait VerificationProbe: Send + Sync {
    async fn probe(&self) -> Result<(bool, String)>;
}

/// Placeholder probe for preconditions without a real verifier wired in
pub struct StubProbe {
    subject: &'static str,
}

impl StubProbe {
    pub fn new(subject: &'static str) -> Self {
        Self { subject }
    }
}

#[async_trait]
impl VerificationProbe for StubProbe {
    async fn probe(&self) -> Result<(bool, String)> {
        Ok((
            true,
            format!("{}: no probe configured, result unverified", self.subject),
        ))
    }
}

pub(super) async fn probe_check(probe: &dyn VerificationProbe) -> Result<(bool, String)> {
    probe.probe().await
}
