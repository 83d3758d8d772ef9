//! Strategy executors and the shared execution protocol
//!
//! All three strategies run the identical sequence: validate, safety gate,
//! snapshot, compute target, apply, settle and verify, roll back on failure,
//! record. The sequence lives here once, in [`run_protocol`]; each strategy
//! supplies only its own state math and mutation/verification primitives
//! through the [`Strategy`] trait. Dispatch from an action to its executor
//! is the closed [`Executor`] enum, so adding a strategy is a
//! compile-time-checked change.

mod cost;
mod rightsize;
mod zero_pod;

pub use cost::{CostOptimizationConfig, CostOptimizer};
pub use rightsize::{ResourceRightsizer, RightsizingConfig};
pub use zero_pod::{ScalingConfig, ZeroPodScaler};

use crate::cluster::{workload_selector, ClusterOps, PodPhase};
use crate::error::{OptimizerError, Result};
use crate::models::{ActionStatus, ActionType, OptimizationAction};
use crate::safety::SafetyManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of the snapshot-and-compute step
pub(crate) enum Prepared<P> {
    /// A mutation is required; proceed with the computed plan
    Proceed(P),
    /// The target state already holds; succeed without mutating
    AlreadySatisfied(String),
    /// The strategy declines to mutate (e.g. savings below threshold)
    Abort(String),
}

/// Strategy-specific steps of the shared protocol
#[async_trait]
pub(crate) trait Strategy: Send + Sync {
    /// Pre-mutation snapshot plus computed target state
    type Plan: Send + Sync;

    fn action_type(&self) -> ActionType;

    /// Steps 3 and 4: fetch live state and compute the target
    async fn prepare(&self, action: &OptimizationAction) -> Result<Prepared<Self::Plan>>;

    /// Step 5: issue the mutation
    async fn apply(&self, action: &OptimizationAction, plan: &Self::Plan) -> Result<()>;

    /// Step 6a: re-fetch state and check the mutated value against the
    /// target within tolerance
    async fn verify_target(&self, action: &OptimizationAction, plan: &Self::Plan) -> Result<bool>;

    /// Step 6b expectation: whether a healthy post-state still has Running
    /// pods (scale-to-zero expects the workload drained instead)
    fn expects_running_pods(&self) -> bool {
        true
    }
}

/// Common execution summary handed back to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: Uuid,
    pub action_type: ActionType,
    pub success: bool,
    pub verification_passed: bool,
    pub mutated: bool,
    pub rollback_required: bool,
    pub rollback_succeeded: Option<bool>,
    #[serde(with = "crate::models::duration_secs")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Internal protocol result carrying the strategy plan for record-keeping
pub(crate) struct ProtocolOutcome<P> {
    pub plan: Option<P>,
    pub common: ActionOutcome,
}

/// One in-flight operation, tracked per executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveOperation {
    pub action_id: Uuid,
    pub workload: String,
    pub namespace: String,
    pub action_type: ActionType,
    pub started_at: DateTime<Utc>,
}

/// Concurrent registry of in-flight operations
pub struct ActiveOperations {
    operations: DashMap<Uuid, ActiveOperation>,
}

impl ActiveOperations {
    pub fn new() -> Self {
        Self {
            operations: DashMap::new(),
        }
    }

    fn register(&self, action: &OptimizationAction) {
        self.operations.insert(
            action.id,
            ActiveOperation {
                action_id: action.id,
                workload: action.workload.clone(),
                namespace: action.namespace.clone(),
                action_type: action.action_type,
                started_at: Utc::now(),
            },
        );
    }

    fn remove(&self, action_id: &Uuid) {
        self.operations.remove(action_id);
    }

    pub fn list(&self) -> Vec<ActiveOperation> {
        self.operations.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for ActiveOperations {
    fn default() -> Self {
        Self::new()
    }
}

/// One finalized execution record, however the strategy shapes it
pub(crate) trait ExecutionRecord {
    fn success(&self) -> bool;
    fn rolled_back(&self) -> bool;
    fn elapsed(&self) -> Duration;
}

/// Aggregate executor counters for dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorMetrics {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub rollback_count: usize,
    pub average_execution_secs: f64,
    pub active_operations: usize,
}

impl ExecutorMetrics {
    pub(crate) fn from_records<R: ExecutionRecord>(records: &[R], active: usize) -> Self {
        let total = records.len();
        let successful = records.iter().filter(|r| r.success()).count();
        let rollbacks = records.iter().filter(|r| r.rolled_back()).count();
        let average = if total > 0 {
            records.iter().map(|r| r.elapsed().as_secs_f64()).sum::<f64>() / total as f64
        } else {
            0.0
        };

        Self {
            total_operations: total,
            successful_operations: successful,
            failed_operations: total - successful,
            rollback_count: rollbacks,
            average_execution_secs: average,
            active_operations: active,
        }
    }
}

/// Drive one action through the shared eight-step protocol
pub(crate) async fn run_protocol<S: Strategy>(
    strategy: &S,
    safety: &SafetyManager,
    cluster: &dyn ClusterOps,
    active: &ActiveOperations,
    settle_delay: Duration,
    verify_timeout: Duration,
    action: &mut OptimizationAction,
) -> ProtocolOutcome<S::Plan> {
    let start = Instant::now();
    let action_id = action.id;
    let action_type = action.action_type;

    let fail = move |reason: String| ActionOutcome {
        action_id,
        action_type,
        success: false,
        verification_passed: false,
        mutated: false,
        rollback_required: false,
        rollback_succeeded: None,
        elapsed: start.elapsed(),
        failure_reason: Some(reason),
    };

    // Step 1: validate without contacting the cluster
    if let Err(e) = validate(strategy, action) {
        return ProtocolOutcome {
            plan: None,
            common: fail(e.to_string()),
        };
    }

    if let Err(e) = action.advance(ActionStatus::Executing) {
        return ProtocolOutcome {
            plan: None,
            common: fail(e.to_string()),
        };
    }
    active.register(action);

    let outcome = run_gated_steps(
        strategy,
        safety,
        cluster,
        settle_delay,
        verify_timeout,
        action,
        start,
    )
    .await;

    active.remove(&action.id);
    outcome
}

fn validate<S: Strategy>(strategy: &S, action: &OptimizationAction) -> Result<()> {
    if action.workload.is_empty() || action.namespace.is_empty() {
        return Err(OptimizerError::Validation(format!(
            "action {} is missing workload or namespace",
            action.id
        )));
    }
    if action.action_type != strategy.action_type() {
        return Err(OptimizerError::Validation(format!(
            "action {} has type {} but was dispatched to the {} executor",
            action.id,
            action.action_type,
            strategy.action_type()
        )));
    }
    Ok(())
}

async fn run_gated_steps<S: Strategy>(
    strategy: &S,
    safety: &SafetyManager,
    cluster: &dyn ClusterOps,
    settle_delay: Duration,
    verify_timeout: Duration,
    action: &mut OptimizationAction,
    start: Instant,
) -> ProtocolOutcome<S::Plan> {
    let mut outcome = ActionOutcome {
        action_id: action.id,
        action_type: action.action_type,
        success: false,
        verification_passed: false,
        mutated: false,
        rollback_required: false,
        rollback_succeeded: None,
        elapsed: Duration::ZERO,
        failure_reason: None,
    };

    // Step 2: safety gate; no mutation past a failed critical check
    match safety.perform_safety_checks(action).await {
        Ok(results) => {
            if let Some(failure) = safety.critical_failure(&results) {
                let err = OptimizerError::Gating {
                    check: failure.check_name.clone(),
                    detail: failure.detail.clone(),
                };
                let _ = action.advance(ActionStatus::Failed);
                outcome.failure_reason = Some(err.to_string());
                outcome.elapsed = start.elapsed();
                return ProtocolOutcome {
                    plan: None,
                    common: outcome,
                };
            }
        }
        Err(e) => {
            let _ = action.advance(ActionStatus::Failed);
            outcome.failure_reason = Some(e.to_string());
            outcome.elapsed = start.elapsed();
            return ProtocolOutcome {
                plan: None,
                common: outcome,
            };
        }
    }

    // Steps 3 and 4: snapshot live state, compute the target
    let plan = match strategy.prepare(action).await {
        Ok(Prepared::Proceed(plan)) => plan,
        Ok(Prepared::AlreadySatisfied(detail)) => {
            debug!(action_id = %action.id, detail = %detail, "Target state already holds");
            let _ = action.advance(ActionStatus::Completed);
            outcome.success = true;
            outcome.verification_passed = true;
            outcome.elapsed = start.elapsed();
            return ProtocolOutcome {
                plan: None,
                common: outcome,
            };
        }
        Ok(Prepared::Abort(detail)) => {
            info!(action_id = %action.id, detail = %detail, "Strategy declined to mutate");
            let _ = action.advance(ActionStatus::Failed);
            outcome.failure_reason = Some(detail);
            outcome.elapsed = start.elapsed();
            return ProtocolOutcome {
                plan: None,
                common: outcome,
            };
        }
        Err(e) => {
            let _ = action.advance(ActionStatus::Failed);
            outcome.failure_reason = Some(e.to_string());
            outcome.elapsed = start.elapsed();
            return ProtocolOutcome {
                plan: None,
                common: outcome,
            };
        }
    };

    // Step 5: apply the mutation; a failed call leaves the cluster untouched
    if let Err(e) = strategy.apply(action, &plan).await {
        let _ = action.advance(ActionStatus::Failed);
        outcome.failure_reason = Some(OptimizerError::Mutation(e.to_string()).to_string());
        outcome.elapsed = start.elapsed();
        return ProtocolOutcome {
            plan: Some(plan),
            common: outcome,
        };
    }
    outcome.mutated = true;

    // Step 6: settle, then verify target state and workload health
    tokio::time::sleep(settle_delay).await;
    let verified = verify(strategy, cluster, action, &plan, verify_timeout).await;

    if verified {
        let _ = action.advance(ActionStatus::Completed);
        outcome.success = true;
        outcome.verification_passed = true;
        outcome.elapsed = start.elapsed();
        return ProtocolOutcome {
            plan: Some(plan),
            common: outcome,
        };
    }

    // Step 7: mandatory rollback after a failed verification
    warn!(
        action_id = %action.id,
        workload = %action.workload,
        namespace = %action.namespace,
        "Verification failed, rolling back"
    );
    outcome.rollback_required = true;
    let rollback_ok = safety.rollback_action(action).await;
    outcome.rollback_succeeded = Some(rollback_ok);

    let _ = action.advance(ActionStatus::Failed);
    if rollback_ok {
        let _ = action.advance(ActionStatus::RolledBack);
        outcome.failure_reason =
            Some(OptimizerError::Verification("post-mutation state did not match target".into())
                .to_string());
    } else {
        outcome.failure_reason = Some(
            OptimizerError::Rollback(format!(
                "FATAL: rollback failed for {}/{}; original state not restored",
                action.namespace, action.workload
            ))
            .to_string(),
        );
    }
    outcome.elapsed = start.elapsed();
    ProtocolOutcome {
        plan: Some(plan),
        common: outcome,
    }
}

async fn verify<S: Strategy>(
    strategy: &S,
    cluster: &dyn ClusterOps,
    action: &OptimizationAction,
    plan: &S::Plan,
    verify_timeout: Duration,
) -> bool {
    let target_and_health = async {
        let target_ok = match strategy.verify_target(action, plan).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(action_id = %action.id, error = %e, "Target verification errored");
                false
            }
        };
        if !target_ok {
            return false;
        }

        let selector = workload_selector(&action.workload);
        match cluster.list_pods(&action.namespace, &selector).await {
            Ok(pods) => {
                let running = pods.iter().any(|p| p.phase == PodPhase::Running);
                if strategy.expects_running_pods() {
                    running
                } else {
                    !running
                }
            }
            Err(e) => {
                warn!(action_id = %action.id, error = %e, "Health verification errored");
                false
            }
        }
    };

    match tokio::time::timeout(verify_timeout, target_and_health).await {
        Ok(ok) => ok,
        Err(_) => {
            warn!(
                action_id = %action.id,
                timeout_secs = verify_timeout.as_secs(),
                "Verification timed out waiting for convergence"
            );
            false
        }
    }
}

/// Closed dispatch from an action type to its executor
pub enum Executor {
    ZeroPod(Arc<ZeroPodScaler>),
    Rightsize(Arc<ResourceRightsizer>),
    CostOptimize(Arc<CostOptimizer>),
}

impl Executor {
    pub fn action_type(&self) -> ActionType {
        match self {
            Executor::ZeroPod(_) => ActionType::ScaleToZero,
            Executor::Rightsize(_) => ActionType::Rightsize,
            Executor::CostOptimize(_) => ActionType::CostOptimize,
        }
    }

    /// Execute the action through the matching strategy
    pub async fn execute(&self, action: &mut OptimizationAction) -> ActionOutcome {
        match self {
            Executor::ZeroPod(scaler) => scaler.scale_to_zero(action).await,
            Executor::Rightsize(rightsizer) => rightsizer.optimize_resources(action).await,
            Executor::CostOptimize(optimizer) => optimizer.optimize_cost(action).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_metrics_from_empty_history() {
        struct R;
        impl ExecutionRecord for R {
            fn success(&self) -> bool {
                true
            }
            fn rolled_back(&self) -> bool {
                false
            }
            fn elapsed(&self) -> Duration {
                Duration::from_secs(1)
            }
        }
        let metrics = ExecutorMetrics::from_records::<R>(&[], 0);
        assert_eq!(metrics.total_operations, 0);
        assert_eq!(metrics.average_execution_secs, 0.0);
    }

    #[test]
    fn test_executor_metrics_aggregation() {
        struct R(bool, bool, u64);
        impl ExecutionRecord for R {
            fn success(&self) -> bool {
                self.0
            }
            fn rolled_back(&self) -> bool {
                self.1
            }
            fn elapsed(&self) -> Duration {
                Duration::from_secs(self.2)
            }
        }
        let records = vec![R(true, false, 2), R(false, true, 4)];
        let metrics = ExecutorMetrics::from_records(&records, 1);

        assert_eq!(metrics.total_operations, 2);
        assert_eq!(metrics.successful_operations, 1);
        assert_eq!(metrics.failed_operations, 1);
        assert_eq!(metrics.rollback_count, 1);
        assert_eq!(metrics.active_operations, 1);
        assert!((metrics.average_execution_secs - 3.0).abs() < f64::EPSILON);
    }
}
