//! Cluster read/write boundary
//!
//! The optimizer core never talks to Kubernetes directly; every read and
//! mutation goes through the [`ClusterOps`] trait. Any failed call aborts
//! the caller's current step, never falls back to a silent default.

mod kube_client;

pub use kube_client::{
    format_cpu_quantity, format_memory_quantity, parse_cpu_quantity, parse_memory_quantity,
    KubeCluster,
};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deployment state as read from the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    /// Resource requests per dimension, Kubernetes quantity strings
    pub resource_requests: HashMap<String, String>,
    /// Resource limits per dimension, Kubernetes quantity strings
    pub resource_limits: HashMap<String, String>,
    pub available_replicas: i32,
    pub ready_replicas: i32,
}

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// Minimal pod view for health evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSummary {
    pub name: String,
    pub phase: PodPhase,
}

/// Cluster-wide utilization snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub node_count: usize,
    /// Unallocated CPU cores across the cluster
    pub free_cpu_cores: f64,
    /// Unallocated memory across the cluster
    pub free_memory_bytes: u64,
}

/// Observed usage for one workload's pods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodUsage {
    pub cpu_usage_cores: f64,
    pub memory_usage_bytes: u64,
}

/// Read/write surface the optimizer consumes
#[async_trait]
pub trait ClusterOps: Send + Sync {
    async fn get_deployment_info(&self, name: &str, namespace: &str) -> Result<DeploymentInfo>;

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<PodSummary>>;

    async fn scale_deployment(&self, name: &str, namespace: &str, replicas: i32) -> Result<()>;

    async fn patch_deployment_resources(
        &self,
        name: &str,
        namespace: &str,
        requests: &HashMap<String, String>,
        limits: &HashMap<String, String>,
    ) -> Result<()>;

    async fn get_cluster_metrics(&self) -> Result<ClusterMetrics>;

    async fn get_pod_metrics(&self, name: &str, namespace: &str) -> Result<PodUsage>;
}

/// Label selector for a workload's pods, matching the convention the
/// deployment controller stamps on them
pub fn workload_selector(workload: &str) -> String {
    format!("app={}", workload)
}
