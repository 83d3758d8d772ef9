//! Safety gating and rollback execution
//!
//! The safety manager runs named pre-flight checks against cluster and
//! workload state before any mutation, and restores the pre-mutation state
//! captured in an action's rollback plan after a failed one. Every check
//! result is appended to an audit history.

mod checks;

pub use checks::{StubProbe, VerificationProbe};

use crate::cluster::{workload_selector, ClusterOps, PodPhase};
use crate::error::{OptimizerError, Result};
use crate::models::{OptimizationAction, RollbackOp, SafetyCheckResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

/// Check names, in registration order
pub mod check_names {
    pub const CLUSTER_HEALTH: &str = "cluster_health";
    pub const WORKLOAD_HEALTH: &str = "workload_health";
    pub const RESOURCE_AVAILABILITY: &str = "resource_availability";
    pub const PERFORMANCE_BASELINE: &str = "performance_baseline";
    pub const BACKUP_VERIFICATION: &str = "backup_verification";
    pub const NETWORK_CONNECTIVITY: &str = "network_connectivity";
}

/// Thresholds and delays for safety evaluation
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// Cluster CPU utilization ceiling for cluster_health
    pub max_cluster_cpu_percent: f64,
    /// Cluster memory utilization ceiling for cluster_health
    pub max_cluster_memory_percent: f64,
    /// Fraction of a workload's pods that must be Running
    pub min_running_pod_ratio: f64,
    /// Free CPU cores required cluster-wide
    pub min_free_cpu_cores: f64,
    /// Free memory required cluster-wide
    pub min_free_memory_bytes: u64,
    /// Settle delay between rollback mutation and verification
    pub rollback_settle_delay: Duration,
    /// Upper bound on a full rollback attempt
    pub rollback_timeout: Duration,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_cluster_cpu_percent: 90.0,
            max_cluster_memory_percent: 90.0,
            min_running_pod_ratio: 0.5,
            min_free_cpu_cores: 0.5,
            min_free_memory_bytes: 512 * 1024 * 1024,
            rollback_settle_delay: Duration::from_secs(10),
            rollback_timeout: Duration::from_secs(300),
        }
    }
}

/// A registered check: name, whether failure blocks execution, and whether
/// it currently runs at all
#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub name: &'static str,
    pub critical: bool,
    pub enabled: bool,
}

fn default_checks() -> Vec<CheckSpec> {
    vec![
        CheckSpec {
            name: check_names::CLUSTER_HEALTH,
            critical: true,
            enabled: true,
        },
        CheckSpec {
            name: check_names::WORKLOAD_HEALTH,
            critical: true,
            enabled: true,
        },
        CheckSpec {
            name: check_names::RESOURCE_AVAILABILITY,
            critical: true,
            enabled: true,
        },
        CheckSpec {
            name: check_names::PERFORMANCE_BASELINE,
            critical: false,
            enabled: true,
        },
        CheckSpec {
            name: check_names::BACKUP_VERIFICATION,
            critical: false,
            enabled: true,
        },
        CheckSpec {
            name: check_names::NETWORK_CONNECTIVITY,
            critical: false,
            enabled: true,
        },
    ]
}

/// Aggregate counters over the safety history
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SafetyMetrics {
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub rollbacks_attempted: usize,
    pub rollbacks_succeeded: usize,
    pub average_check_duration_ms: f64,
}

/// Runs pre-flight checks and executes rollbacks
pub struct SafetyManager {
    cluster: Arc<dyn ClusterOps>,
    config: SafetyConfig,
    checks: Vec<CheckSpec>,
    backup_probe: Arc<dyn VerificationProbe>,
    network_probe: Arc<dyn VerificationProbe>,
    history: RwLock<Vec<SafetyCheckResult>>,
    rollback_stats: RwLock<(usize, usize)>,
}

impl SafetyManager {
    pub fn new(cluster: Arc<dyn ClusterOps>, config: SafetyConfig) -> Self {
        Self {
            cluster,
            config,
            checks: default_checks(),
            backup_probe: Arc::new(StubProbe::new("backup store")),
            network_probe: Arc::new(StubProbe::new("cluster network")),
            history: RwLock::new(Vec::new()),
            rollback_stats: RwLock::new((0, 0)),
        }
    }

    /// Replace the backup verification probe
    pub fn with_backup_probe(mut self, probe: Arc<dyn VerificationProbe>) -> Self {
        self.backup_probe = probe;
        self
    }

    /// Replace the network connectivity probe
    pub fn with_network_probe(mut self, probe: Arc<dyn VerificationProbe>) -> Self {
        self.network_probe = probe;
        self
    }

    /// Enable or disable a registered check by name
    pub fn set_check_enabled(&mut self, name: &str, enabled: bool) {
        if let Some(check) = self.checks.iter_mut().find(|c| c.name == name) {
            check.enabled = enabled;
        }
    }

    /// Names of all registered checks
    pub fn registered_checks(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name).collect()
    }

    /// Run every enabled registered check against the action's target
    ///
    /// All results are returned and recorded; callers must abort the action
    /// when any critical check failed (see [`critical_failure`]).
    pub async fn perform_safety_checks(
        &self,
        action: &OptimizationAction,
    ) -> Result<Vec<SafetyCheckResult>> {
        let mut results = Vec::with_capacity(self.checks.len());

        for check in self.checks.iter().filter(|c| c.enabled) {
            let start = Instant::now();
            let outcome = self.run_check(check.name, action).await;
            let duration = start.elapsed();

            let result = match outcome {
                Ok((passed, detail)) => SafetyCheckResult {
                    check_name: check.name.to_string(),
                    passed,
                    detail,
                    duration,
                    error: None,
                },
                Err(e) => SafetyCheckResult {
                    check_name: check.name.to_string(),
                    passed: false,
                    detail: "check execution failed".to_string(),
                    duration,
                    error: Some(e.to_string()),
                },
            };

            if !result.passed {
                warn!(
                    check = check.name,
                    critical = check.critical,
                    workload = %action.workload,
                    namespace = %action.namespace,
                    detail = %result.detail,
                    "Safety check failed"
                );
            }

            results.push(result);
        }

        self.history.write().await.extend(results.iter().cloned());
        Ok(results)
    }

    /// The first failed critical check among `results`, if any
    pub fn critical_failure<'a>(
        &self,
        results: &'a [SafetyCheckResult],
    ) -> Option<&'a SafetyCheckResult> {
        results.iter().find(|r| {
            !r.passed
                && self
                    .checks
                    .iter()
                    .any(|c| c.name == r.check_name && c.critical)
        })
    }

    async fn run_check(
        &self,
        name: &str,
        action: &OptimizationAction,
    ) -> Result<(bool, String)> {
        match name {
            check_names::CLUSTER_HEALTH => {
                checks::cluster_health(self.cluster.as_ref(), &self.config).await
            }
            check_names::WORKLOAD_HEALTH => {
                checks::workload_health(self.cluster.as_ref(), &self.config, action).await
            }
            check_names::RESOURCE_AVAILABILITY => {
                checks::resource_availability(self.cluster.as_ref(), &self.config).await
            }
            check_names::PERFORMANCE_BASELINE => {
                checks::performance_baseline(self.cluster.as_ref(), action).await
            }
            check_names::BACKUP_VERIFICATION => {
                checks::probe_check(self.backup_probe.as_ref()).await
            }
            check_names::NETWORK_CONNECTIVITY => {
                checks::probe_check(self.network_probe.as_ref()).await
            }
            other => Err(OptimizerError::Validation(format!(
                "unknown safety check '{}'",
                other
            ))),
        }
    }

    /// Execute the action's rollback plan and verify workload health
    ///
    /// Returns whether the rollback restored a healthy state. A failed
    /// rollback is terminal; no retry is attempted here or by callers.
    pub async fn rollback_action(&self, action: &OptimizationAction) -> bool {
        {
            let mut stats = self.rollback_stats.write().await;
            stats.0 += 1;
        }

        let plan = &action.rollback_plan;
        info!(
            action_id = %action.id,
            workload = %action.workload,
            namespace = %action.namespace,
            operations = plan.operations.len(),
            "Executing rollback plan"
        );

        let attempt = self.execute_rollback_ops(action);
        let outcome = match tokio::time::timeout(plan.timeout, attempt).await {
            Ok(Ok(())) => self.verify_rollback(action).await,
            Ok(Err(e)) => {
                warn!(action_id = %action.id, error = %e, "Rollback operation failed");
                false
            }
            Err(_) => {
                warn!(
                    action_id = %action.id,
                    timeout_secs = plan.timeout.as_secs(),
                    "Rollback timed out"
                );
                false
            }
        };

        if outcome {
            let mut stats = self.rollback_stats.write().await;
            stats.1 += 1;
            info!(action_id = %action.id, "Rollback verified");
        } else {
            warn!(
                action_id = %action.id,
                workload = %action.workload,
                "Rollback could not restore workload health; operator attention required"
            );
        }
        outcome
    }

    async fn execute_rollback_ops(&self, action: &OptimizationAction) -> Result<()> {
        for op in &action.rollback_plan.operations {
            match op {
                RollbackOp::ScaleReplicas { replicas } => {
                    self.cluster
                        .scale_deployment(&action.workload, &action.namespace, *replicas)
                        .await
                        .map_err(|e| OptimizerError::Rollback(e.to_string()))?;
                }
                RollbackOp::RestoreResources { requests, limits } => {
                    self.cluster
                        .patch_deployment_resources(
                            &action.workload,
                            &action.namespace,
                            requests,
                            limits,
                        )
                        .await
                        .map_err(|e| OptimizerError::Rollback(e.to_string()))?;
                }
                RollbackOp::RestoreConfiguration => {
                    // Cost transforms are configuration-level; restoring them
                    // is a logged settle, not a cluster mutation.
                    info!(
                        action_id = %action.id,
                        workload = %action.workload,
                        "Restoring cost configuration"
                    );
                }
            }
        }
        Ok(())
    }

    /// Post-rollback verification: the workload must have at least one
    /// Running pod again
    async fn verify_rollback(&self, action: &OptimizationAction) -> bool {
        tokio::time::sleep(self.config.rollback_settle_delay).await;

        let selector = workload_selector(&action.workload);
        match self.cluster.list_pods(&action.namespace, &selector).await {
            Ok(pods) => pods.iter().any(|p| p.phase == PodPhase::Running),
            Err(e) => {
                warn!(
                    action_id = %action.id,
                    error = %e,
                    "Rollback verification could not list pods"
                );
                false
            }
        }
    }

    /// Audit history of every check result recorded so far
    pub async fn history(&self) -> Vec<SafetyCheckResult> {
        self.history.read().await.clone()
    }

    /// Aggregate snapshot for dashboards
    pub async fn get_safety_metrics(&self) -> SafetyMetrics {
        let history = self.history.read().await;
        let (attempted, succeeded) = *self.rollback_stats.read().await;

        let total = history.len();
        let passed = history.iter().filter(|r| r.passed).count();
        let avg_ms = if total > 0 {
            history
                .iter()
                .map(|r| r.duration.as_secs_f64() * 1000.0)
                .sum::<f64>()
                / total as f64
        } else {
            0.0
        };

        SafetyMetrics {
            total_checks: total,
            passed_checks: passed,
            failed_checks: total - passed,
            rollbacks_attempted: attempted,
            rollbacks_succeeded: succeeded,
            average_check_duration_ms: avg_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::mock::{deployment, MockCluster};
    use crate::cluster::{ClusterMetrics, PodSummary};
    use crate::models::{ActionStatus, ActionType, RiskLevel, RollbackPlan};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn test_config() -> SafetyConfig {
        SafetyConfig {
            rollback_settle_delay: Duration::ZERO,
            ..SafetyConfig::default()
        }
    }

    fn scale_action(workload: &str, original_replicas: i32) -> OptimizationAction {
        OptimizationAction {
            id: Uuid::new_v4(),
            strategy: "zero_pod_scaling".to_string(),
            workload: workload.to_string(),
            namespace: "default".to_string(),
            action_type: ActionType::ScaleToZero,
            current_state: HashMap::new(),
            target_state: HashMap::new(),
            estimated_savings: 10.0,
            risk_level: RiskLevel::Medium,
            confidence: 0.9,
            prerequisite_checks: vec![check_names::CLUSTER_HEALTH.to_string()],
            rollback_plan: RollbackPlan {
                original_state: HashMap::new(),
                operations: vec![RollbackOp::ScaleReplicas {
                    replicas: original_replicas,
                }],
                verification_checks: vec![check_names::WORKLOAD_HEALTH.to_string()],
                timeout: Duration::from_secs(30),
            },
            created_at: chrono::Utc::now(),
            status: ActionStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_all_checks_pass_on_healthy_cluster() {
        let cluster = Arc::new(MockCluster::new().with_deployment(deployment("web", "default", 3)));
        let manager = SafetyManager::new(cluster, test_config());

        let action = scale_action("web", 3);
        let results = manager.perform_safety_checks(&action).await.unwrap();

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.passed));
        assert!(manager.critical_failure(&results).is_none());
    }

    #[tokio::test]
    async fn test_cluster_health_fails_on_high_cpu() {
        let cluster = Arc::new(
            MockCluster::new()
                .with_deployment(deployment("web", "default", 3))
                .with_cluster_metrics(ClusterMetrics {
                    cpu_usage_percent: 95.0,
                    memory_usage_percent: 50.0,
                    node_count: 3,
                    free_cpu_cores: 4.0,
                    free_memory_bytes: 8 * 1024 * 1024 * 1024,
                }),
        );
        let manager = SafetyManager::new(cluster, test_config());

        let action = scale_action("web", 3);
        let results = manager.perform_safety_checks(&action).await.unwrap();

        let failure = manager.critical_failure(&results).unwrap();
        assert_eq!(failure.check_name, check_names::CLUSTER_HEALTH);
    }

    #[tokio::test]
    async fn test_workload_health_requires_half_running() {
        use crate::cluster::PodPhase;

        let cluster = Arc::new(
            MockCluster::new()
                .with_deployment(deployment("web", "default", 4))
                .with_pods(
                    "default",
                    &workload_selector("web"),
                    vec![
                        PodSummary {
                            name: "web-0".to_string(),
                            phase: PodPhase::Running,
                        },
                        PodSummary {
                            name: "web-1".to_string(),
                            phase: PodPhase::Failed,
                        },
                        PodSummary {
                            name: "web-2".to_string(),
                            phase: PodPhase::Pending,
                        },
                        PodSummary {
                            name: "web-3".to_string(),
                            phase: PodPhase::Failed,
                        },
                    ],
                ),
        );
        let manager = SafetyManager::new(cluster, test_config());

        let action = scale_action("web", 4);
        let results = manager.perform_safety_checks(&action).await.unwrap();

        let failure = manager.critical_failure(&results).unwrap();
        assert_eq!(failure.check_name, check_names::WORKLOAD_HEALTH);
    }

    #[tokio::test]
    async fn test_unreachable_metrics_fail_closed() {
        let cluster = Arc::new(
            MockCluster::new()
                .with_deployment(deployment("web", "default", 3))
                .failing("get_cluster_metrics"),
        );
        let manager = SafetyManager::new(cluster, test_config());

        let action = scale_action("web", 3);
        let results = manager.perform_safety_checks(&action).await.unwrap();

        // cluster_health and resource_availability both depend on metrics
        assert!(manager.critical_failure(&results).is_some());
    }

    #[tokio::test]
    async fn test_disabled_check_does_not_run() {
        let cluster = Arc::new(MockCluster::new().with_deployment(deployment("web", "default", 3)));
        let mut manager = SafetyManager::new(cluster, test_config());
        manager.set_check_enabled(check_names::BACKUP_VERIFICATION, false);

        let action = scale_action("web", 3);
        let results = manager.perform_safety_checks(&action).await.unwrap();

        assert_eq!(results.len(), 5);
        assert!(!results
            .iter()
            .any(|r| r.check_name == check_names::BACKUP_VERIFICATION));
    }

    #[tokio::test]
    async fn test_rollback_restores_replicas_and_verifies() {
        let cluster = Arc::new(MockCluster::new().with_deployment(deployment("web", "default", 3)));
        // Simulate a scaled-to-zero workload awaiting rollback
        cluster.scale_deployment("web", "default", 0).await.unwrap();
        let manager = SafetyManager::new(cluster.clone(), test_config());

        let action = scale_action("web", 3);
        assert!(manager.rollback_action(&action).await);
        assert_eq!(cluster.replicas_of("web", "default"), Some(3));

        let metrics = manager.get_safety_metrics().await;
        assert_eq!(metrics.rollbacks_attempted, 1);
        assert_eq!(metrics.rollbacks_succeeded, 1);
    }

    #[tokio::test]
    async fn test_rollback_failure_is_reported_not_retried() {
        let cluster = Arc::new(
            MockCluster::new()
                .with_deployment(deployment("web", "default", 3))
                .failing("scale_deployment"),
        );
        let manager = SafetyManager::new(cluster.clone(), test_config());

        let action = scale_action("web", 3);
        assert!(!manager.rollback_action(&action).await);
        // Exactly one attempt, no automatic retry
        assert!(cluster.scale_calls().is_empty());

        let metrics = manager.get_safety_metrics().await;
        assert_eq!(metrics.rollbacks_attempted, 1);
        assert_eq!(metrics.rollbacks_succeeded, 0);
    }

    #[tokio::test]
    async fn test_history_accumulates() {
        let cluster = Arc::new(MockCluster::new().with_deployment(deployment("web", "default", 3)));
        let manager = SafetyManager::new(cluster, test_config());

        let action = scale_action("web", 3);
        manager.perform_safety_checks(&action).await.unwrap();
        manager.perform_safety_checks(&action).await.unwrap();

        assert_eq!(manager.history().await.len(), 12);
        let metrics = manager.get_safety_metrics().await;
        assert_eq!(metrics.total_checks, 12);
        assert_eq!(metrics.failed_checks, 0);
    }
}
