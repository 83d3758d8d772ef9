//! Resource rightsizing executor
//!
//! Recomputes CPU and memory requests from observed usage with a safety
//! margin, floors, and a change threshold that suppresses churn: a request
//! is only replaced when the optimized value undercuts it by more than the
//! configured threshold.

use super::{
    run_protocol, ActionOutcome, ActiveOperations, ExecutionRecord, ExecutorMetrics, Prepared,
    Strategy,
};
use crate::cluster::{
    format_cpu_quantity, format_memory_quantity, parse_cpu_quantity, parse_memory_quantity,
    ClusterOps,
};
use crate::error::{OptimizerError, Result};
use crate::models::{ActionType, OptimizationAction, ResourceChange, RightsizingResult};
use crate::safety::SafetyManager;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Default settle delay before post-patch verification
pub const DEFAULT_VERIFICATION_DELAY: Duration = Duration::from_secs(120);

/// Configuration for the rightsizer
#[derive(Debug, Clone)]
pub struct RightsizingConfig {
    /// Headroom multiplier applied to observed usage
    pub safety_margin: f64,
    /// Minimum relative reduction before a request is replaced
    pub optimization_threshold: f64,
    /// CPU request floor in cores
    pub min_cpu_cores: f64,
    /// Memory request floor in bytes
    pub min_memory_bytes: u64,
    /// Limit = optimized request x multiplier
    pub cpu_limit_multiplier: f64,
    pub memory_limit_multiplier: f64,
    pub cpu_enabled: bool,
    pub memory_enabled: bool,
    /// Settle delay between mutation and verification
    pub verification_delay: Duration,
    /// Upper bound on waiting for cluster convergence
    pub optimization_timeout: Duration,
    /// Relative tolerance when comparing patched requests to the target
    pub verification_tolerance: f64,
}

impl Default for RightsizingConfig {
    fn default() -> Self {
        Self {
            safety_margin: 0.20,
            optimization_threshold: 0.30,
            min_cpu_cores: 0.1,
            min_memory_bytes: 64 * 1024 * 1024,
            cpu_limit_multiplier: 2.0,
            memory_limit_multiplier: 1.5,
            cpu_enabled: true,
            memory_enabled: true,
            verification_delay: DEFAULT_VERIFICATION_DELAY,
            optimization_timeout: Duration::from_secs(300),
            verification_tolerance: 0.05,
        }
    }
}

/// Snapshot and computed targets for one rightsizing cycle
pub(crate) struct RightsizePlan {
    changes: Vec<ResourceChange>,
    new_requests: HashMap<String, String>,
    new_limits: HashMap<String, String>,
}

/// Strategy executor that shrinks over-provisioned requests and limits
pub struct ResourceRightsizer {
    cluster: Arc<dyn ClusterOps>,
    safety: Arc<SafetyManager>,
    config: RightsizingConfig,
    active: ActiveOperations,
    history: RwLock<Vec<RightsizingResult>>,
}

impl ResourceRightsizer {
    pub fn new(
        cluster: Arc<dyn ClusterOps>,
        safety: Arc<SafetyManager>,
        config: RightsizingConfig,
    ) -> Self {
        Self {
            cluster,
            safety,
            config,
            active: ActiveOperations::new(),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Execute a rightsize action through the shared protocol
    pub async fn optimize_resources(&self, action: &mut OptimizationAction) -> ActionOutcome {
        let outcome = run_protocol(
            self,
            &self.safety,
            self.cluster.as_ref(),
            &self.active,
            self.config.verification_delay,
            self.config.optimization_timeout,
            action,
        )
        .await;

        let changes = outcome
            .plan
            .as_ref()
            .map(|p| p.changes.clone())
            .unwrap_or_default();

        let result = RightsizingResult {
            action_id: action.id,
            workload: action.workload.clone(),
            namespace: action.namespace.clone(),
            changes,
            success: outcome.common.success,
            verification_passed: outcome.common.verification_passed,
            rollback_required: outcome.common.rollback_required,
            rollback_succeeded: outcome.common.rollback_succeeded,
            elapsed: outcome.common.elapsed,
            failure_reason: outcome.common.failure_reason.clone(),
        };

        info!(
            action_id = %action.id,
            workload = %action.workload,
            namespace = %action.namespace,
            changes = result.changes.len(),
            success = result.success,
            "Rightsizing cycle finished"
        );

        self.history.write().await.push(result);
        outcome.common
    }

    /// Advisory pre-check: a workload without resource requests has nothing
    /// to rightsize
    pub async fn is_workload_eligible_for_rightsizing(
        &self,
        workload: &str,
        namespace: &str,
    ) -> Result<bool> {
        let info = self.cluster.get_deployment_info(workload, namespace).await?;
        Ok(!info.resource_requests.is_empty())
    }

    /// Optimized request for one dimension: usage plus margin, floored
    fn optimized_value(&self, usage: f64, floor: f64) -> f64 {
        (usage * (1.0 + self.config.safety_margin)).max(floor)
    }

    /// Whether the optimized value undercuts the current request enough to
    /// justify a patch
    fn worth_replacing(&self, optimized: f64, current: f64) -> bool {
        optimized < current * (1.0 - self.config.optimization_threshold)
    }

    /// Finalized records of completed cycles
    pub async fn history(&self) -> Vec<RightsizingResult> {
        self.history.read().await.clone()
    }

    /// Aggregate snapshot for dashboards
    pub async fn get_rightsizing_metrics(&self) -> ExecutorMetrics {
        let history = self.history.read().await;
        ExecutorMetrics::from_records(&history, self.active.len())
    }
}

impl ExecutionRecord for RightsizingResult {
    fn success(&self) -> bool {
        self.success
    }
    fn rolled_back(&self) -> bool {
        self.rollback_required && self.rollback_succeeded == Some(true)
    }
    fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[async_trait]
impl Strategy for ResourceRightsizer {
    type Plan = RightsizePlan;

    fn action_type(&self) -> ActionType {
        ActionType::Rightsize
    }

    async fn prepare(&self, action: &OptimizationAction) -> Result<Prepared<RightsizePlan>> {
        let info = self
            .cluster
            .get_deployment_info(&action.workload, &action.namespace)
            .await?;
        let usage = self
            .cluster
            .get_pod_metrics(&action.workload, &action.namespace)
            .await?;

        if info.resource_requests.is_empty() {
            return Err(OptimizerError::Validation(format!(
                "{}/{} has no resource requests to rightsize",
                action.namespace, action.workload
            )));
        }

        let mut changes = Vec::new();
        let mut new_requests = info.resource_requests.clone();
        let mut new_limits = info.resource_limits.clone();

        if self.config.cpu_enabled {
            if let Some(current_str) = info.resource_requests.get("cpu") {
                let current = parse_cpu_quantity(current_str) as f64 / 1000.0;
                let optimized = self.optimized_value(usage.cpu_usage_cores, self.config.min_cpu_cores);
                if self.worth_replacing(optimized, current) {
                    let request = format_cpu_quantity(optimized);
                    let limit =
                        format_cpu_quantity(optimized * self.config.cpu_limit_multiplier);
                    changes.push(ResourceChange {
                        resource: "cpu".to_string(),
                        old_request: current_str.clone(),
                        new_request: request.clone(),
                        new_limit: limit.clone(),
                    });
                    new_requests.insert("cpu".to_string(), request);
                    new_limits.insert("cpu".to_string(), limit);
                }
            }
        }

        if self.config.memory_enabled {
            if let Some(current_str) = info.resource_requests.get("memory") {
                let current = parse_memory_quantity(current_str) as f64;
                let optimized = self.optimized_value(
                    usage.memory_usage_bytes as f64,
                    self.config.min_memory_bytes as f64,
                );
                if self.worth_replacing(optimized, current) {
                    let request = format_memory_quantity(optimized as u64);
                    let limit = format_memory_quantity(
                        (optimized * self.config.memory_limit_multiplier) as u64,
                    );
                    changes.push(ResourceChange {
                        resource: "memory".to_string(),
                        old_request: current_str.clone(),
                        new_request: request.clone(),
                        new_limit: limit.clone(),
                    });
                    new_requests.insert("memory".to_string(), request);
                    new_limits.insert("memory".to_string(), limit);
                }
            }
        }

        if changes.is_empty() {
            return Ok(Prepared::AlreadySatisfied(format!(
                "{}/{} requests are within {:.0}% of optimal",
                action.namespace,
                action.workload,
                self.config.optimization_threshold * 100.0
            )));
        }

        Ok(Prepared::Proceed(RightsizePlan {
            changes,
            new_requests,
            new_limits,
        }))
    }

    async fn apply(&self, action: &OptimizationAction, plan: &RightsizePlan) -> Result<()> {
        self.cluster
            .patch_deployment_resources(
                &action.workload,
                &action.namespace,
                &plan.new_requests,
                &plan.new_limits,
            )
            .await
    }

    async fn verify_target(
        &self,
        action: &OptimizationAction,
        plan: &RightsizePlan,
    ) -> Result<bool> {
        let info = self
            .cluster
            .get_deployment_info(&action.workload, &action.namespace)
            .await?;

        for change in &plan.changes {
            let live = match info.resource_requests.get(&change.resource) {
                Some(v) => v,
                None => return Ok(false),
            };
            let (live_value, target_value) = if change.resource == "cpu" {
                (
                    parse_cpu_quantity(live) as f64,
                    parse_cpu_quantity(&change.new_request) as f64,
                )
            } else {
                (
                    parse_memory_quantity(live) as f64,
                    parse_memory_quantity(&change.new_request) as f64,
                )
            };
            if target_value == 0.0 {
                return Ok(false);
            }
            let deviation = (live_value - target_value).abs() / target_value;
            if deviation > self.config.verification_tolerance {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
