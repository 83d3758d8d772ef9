//! Kubernetes-backed implementation of the cluster boundary
//!
//! Reads deployments and pods through the typed API, scales and patches via
//! merge patches, and fetches usage from the metrics-server aggregation API
//! (a raw request, since the metrics API is a custom resource).

use super::{ClusterMetrics, ClusterOps, DeploymentInfo, PodPhase, PodSummary, PodUsage};
use crate::error::{OptimizerError, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client, Config,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Kubernetes cluster client
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using the inferred config (in-cluster or kubeconfig)
    pub async fn connect() -> Result<Self> {
        let config = Config::infer()
            .await
            .map_err(|e| OptimizerError::Cluster(format!("failed to infer config: {}", e)))?;
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterOps for KubeCluster {
    async fn get_deployment_info(&self, name: &str, namespace: &str) -> Result<DeploymentInfo> {
        let deployment = self.deployments(namespace).get(name).await?;

        let spec = deployment
            .spec
            .as_ref()
            .ok_or_else(|| OptimizerError::Cluster(format!("deployment {} has no spec", name)))?;
        let status = deployment.status.as_ref();

        // Requests/limits come from the first container of the pod template;
        // multi-container workloads are patched per leading container.
        let (resource_requests, resource_limits) = spec
            .template
            .spec
            .as_ref()
            .and_then(|ps| ps.containers.first())
            .and_then(|c| c.resources.as_ref())
            .map(|r| {
                let to_map = |side: &Option<
                    std::collections::BTreeMap<
                        String,
                        k8s_openapi::apimachinery::pkg::api::resource::Quantity,
                    >,
                >| {
                    side.as_ref()
                        .map(|m| {
                            m.iter()
                                .map(|(k, q)| (k.clone(), q.0.clone()))
                                .collect::<HashMap<_, _>>()
                        })
                        .unwrap_or_default()
                };
                (to_map(&r.requests), to_map(&r.limits))
            })
            .unwrap_or_default();

        Ok(DeploymentInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            replicas: spec.replicas.unwrap_or(0),
            resource_requests,
            resource_limits,
            available_replicas: status.and_then(|s| s.available_replicas).unwrap_or(0),
            ready_replicas: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        })
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<PodSummary>> {
        let params = ListParams::default().labels(label_selector);
        let pods = self.pods(namespace).list(&params).await?;

        Ok(pods
            .items
            .into_iter()
            .map(|pod| {
                let phase = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .map(|p| match p {
                        "Pending" => PodPhase::Pending,
                        "Running" => PodPhase::Running,
                        "Succeeded" => PodPhase::Succeeded,
                        "Failed" => PodPhase::Failed,
                        _ => PodPhase::Unknown,
                    })
                    .unwrap_or(PodPhase::Unknown);
                PodSummary {
                    name: pod.metadata.name.unwrap_or_default(),
                    phase,
                }
            })
            .collect())
    }

    async fn scale_deployment(&self, name: &str, namespace: &str, replicas: i32) -> Result<()> {
        let patch = json!({ "spec": { "replicas": replicas } });
        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!(workload = %name, namespace = %namespace, replicas, "Scaled deployment");
        Ok(())
    }

    async fn patch_deployment_resources(
        &self,
        name: &str,
        namespace: &str,
        requests: &HashMap<String, String>,
        limits: &HashMap<String, String>,
    ) -> Result<()> {
        // Strategic merge needs the container name; read it first.
        let deployment = self.deployments(namespace).get(name).await?;
        let container_name = deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|ps| ps.containers.first())
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                OptimizerError::Cluster(format!("deployment {} has no containers", name))
            })?;

        let patch = json!({
            "spec": {
                "template": {
                    "spec": {
                        "containers": [{
                            "name": container_name,
                            "resources": {
                                "requests": requests,
                                "limits": limits,
                            }
                        }]
                    }
                }
            }
        });

        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Strategic(&patch))
            .await?;
        debug!(workload = %name, namespace = %namespace, "Patched deployment resources");
        Ok(())
    }

    async fn get_cluster_metrics(&self) -> Result<ClusterMetrics> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node_list = nodes.list(&ListParams::default()).await?;

        let mut total_cpu_cores = 0.0f64;
        let mut total_memory_bytes = 0u64;
        for node in &node_list.items {
            if let Some(allocatable) = node.status.as_ref().and_then(|s| s.allocatable.as_ref()) {
                if let Some(cpu) = allocatable.get("cpu") {
                    total_cpu_cores += parse_cpu_quantity(&cpu.0) as f64 / 1000.0;
                }
                if let Some(memory) = allocatable.get("memory") {
                    total_memory_bytes += parse_memory_quantity(&memory.0);
                }
            }
        }

        // Node usage comes from the metrics-server aggregation API.
        let request = http::Request::builder()
            .method("GET")
            .uri("/apis/metrics.k8s.io/v1beta1/nodes")
            .body(Vec::new())
            .map_err(|e| OptimizerError::Cluster(format!("failed to build request: {}", e)))?;

        let usage: NodeMetricsList = self.client.request(request).await.map_err(|e| {
            OptimizerError::Cluster(format!("metrics-server node query failed: {}", e))
        })?;

        let mut used_cpu_cores = 0.0f64;
        let mut used_memory_bytes = 0u64;
        for item in &usage.items {
            used_cpu_cores += parse_cpu_quantity(&item.usage.cpu) as f64 / 1000.0;
            used_memory_bytes += parse_memory_quantity(&item.usage.memory);
        }

        if total_cpu_cores <= 0.0 || total_memory_bytes == 0 {
            warn!("Cluster reports zero allocatable capacity");
        }

        let cpu_usage_percent = if total_cpu_cores > 0.0 {
            (used_cpu_cores / total_cpu_cores) * 100.0
        } else {
            0.0
        };
        let memory_usage_percent = if total_memory_bytes > 0 {
            (used_memory_bytes as f64 / total_memory_bytes as f64) * 100.0
        } else {
            0.0
        };

        Ok(ClusterMetrics {
            cpu_usage_percent,
            memory_usage_percent,
            node_count: node_list.items.len(),
            free_cpu_cores: (total_cpu_cores - used_cpu_cores).max(0.0),
            free_memory_bytes: total_memory_bytes.saturating_sub(used_memory_bytes),
        })
    }

    async fn get_pod_metrics(&self, name: &str, namespace: &str) -> Result<PodUsage> {
        let path = format!("/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods", namespace);
        let request = http::Request::builder()
            .method("GET")
            .uri(&path)
            .body(Vec::new())
            .map_err(|e| OptimizerError::Cluster(format!("failed to build request: {}", e)))?;

        let metrics: PodMetricsList = self.client.request(request).await.map_err(|e| {
            OptimizerError::Cluster(format!("metrics-server pod query failed: {}", e))
        })?;

        let mut cpu_millicores = 0u64;
        let mut memory_bytes = 0u64;
        let mut matched = false;
        for pod in &metrics.items {
            if !pod.metadata.name.starts_with(name) {
                continue;
            }
            matched = true;
            for container in &pod.containers {
                cpu_millicores += parse_cpu_quantity(&container.usage.cpu);
                memory_bytes += parse_memory_quantity(&container.usage.memory);
            }
        }

        if !matched {
            return Err(OptimizerError::Cluster(format!(
                "no metrics for workload {}/{}",
                namespace, name
            )));
        }

        Ok(PodUsage {
            cpu_usage_cores: cpu_millicores as f64 / 1000.0,
            memory_usage_bytes: memory_bytes,
        })
    }
}

// Metrics API response shapes (custom resource, not in k8s-openapi)

#[derive(Debug, Deserialize)]
struct NodeMetricsList {
    items: Vec<NodeMetricsItem>,
}

#[derive(Debug, Deserialize)]
struct NodeMetricsItem {
    usage: ResourceUsage,
}

#[derive(Debug, Deserialize)]
struct PodMetricsList {
    items: Vec<PodMetricsItem>,
}

#[derive(Debug, Deserialize)]
struct PodMetricsItem {
    metadata: PodMetricsMetadata,
    containers: Vec<ContainerMetricsItem>,
}

#[derive(Debug, Deserialize)]
struct PodMetricsMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContainerMetricsItem {
    usage: ResourceUsage,
}

#[derive(Debug, Deserialize)]
struct ResourceUsage {
    cpu: String,
    memory: String,
}

/// Parse a CPU quantity string (e.g. "100m", "1", "500000000n") to millicores
pub fn parse_cpu_quantity(quantity: &str) -> u64 {
    let quantity = quantity.trim();

    if let Some(val) = quantity.strip_suffix('n') {
        val.parse::<u64>().map(|n| n / 1_000_000).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix('u') {
        val.parse::<u64>().map(|u| u / 1_000).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix('m') {
        val.parse::<u64>().unwrap_or(0)
    } else {
        quantity
            .parse::<f64>()
            .map(|c| (c * 1000.0) as u64)
            .unwrap_or(0)
    }
}

/// Parse a memory quantity string (e.g. "128Mi", "1Gi") to bytes
pub fn parse_memory_quantity(quantity: &str) -> u64 {
    let quantity = quantity.trim();

    if let Some(val) = quantity.strip_suffix("Ki") {
        val.parse::<u64>().map(|k| k * 1024).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix("Mi") {
        val.parse::<u64>().map(|m| m * 1024 * 1024).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix("Gi") {
        val.parse::<u64>()
            .map(|g| g * 1024 * 1024 * 1024)
            .unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix("Ti") {
        val.parse::<u64>()
            .map(|t| t * 1024 * 1024 * 1024 * 1024)
            .unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix('M') {
        val.parse::<u64>().map(|m| m * 1_000_000).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix('G') {
        val.parse::<u64>().map(|g| g * 1_000_000_000).unwrap_or(0)
    } else {
        quantity.parse::<u64>().unwrap_or(0)
    }
}

/// Format cores as a Kubernetes CPU quantity (millicores)
pub fn format_cpu_quantity(cores: f64) -> String {
    format!("{}m", (cores * 1000.0).round() as u64)
}

/// Format bytes as a Kubernetes memory quantity (Mi)
pub fn format_memory_quantity(bytes: u64) -> String {
    format!("{}Mi", bytes / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_quantity() {
        assert_eq!(parse_cpu_quantity("100m"), 100);
        assert_eq!(parse_cpu_quantity("1"), 1000);
        assert_eq!(parse_cpu_quantity("0.5"), 500);
        assert_eq!(parse_cpu_quantity("500000000n"), 500);
    }

    #[test]
    fn test_parse_memory_quantity() {
        assert_eq!(parse_memory_quantity("128Mi"), 128 * 1024 * 1024);
        assert_eq!(parse_memory_quantity("1Gi"), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_quantity("1024"), 1024);
    }

    #[test]
    fn test_format_quantities() {
        assert_eq!(format_cpu_quantity(0.25), "250m");
        assert_eq!(format_memory_quantity(512 * 1024 * 1024), "512Mi");
    }
}
