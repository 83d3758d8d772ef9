//! Core data models for the workload optimizer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::OptimizerError;

/// Kind of mutation an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ScaleToZero,
    Rightsize,
    CostOptimize,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ScaleToZero => "scale_to_zero",
            ActionType::Rightsize => "rightsize",
            ActionType::CostOptimize => "cost_optimize",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk classification for an action or plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Lifecycle state of an action or plan
///
/// Transitions only advance forward:
/// pending -> executing -> {completed | failed} -> optionally rolled_back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    RolledBack,
}

impl ActionStatus {
    /// Whether a transition to `next` is legal
    pub fn can_transition(&self, next: ActionStatus) -> bool {
        use ActionStatus::*;
        matches!(
            (self, next),
            (Pending, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Completed, RolledBack)
                | (Failed, RolledBack)
        )
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Executing => "executing",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
            ActionStatus::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// A single templated undo operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RollbackOp {
    /// Scale the workload back to its original replica count
    ScaleReplicas { replicas: i32 },
    /// Restore the original resource requests and limits
    RestoreResources {
        requests: HashMap<String, String>,
        limits: HashMap<String, String>,
    },
    /// Restore the pre-optimization cost configuration
    RestoreConfiguration,
}

/// Captured pre-mutation state plus the procedure to restore it
///
/// Built at the moment an action is proposed, never at execution time, so
/// rollback is always possible even if execution never starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub original_state: HashMap<String, serde_json::Value>,
    pub operations: Vec<RollbackOp>,
    pub verification_checks: Vec<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

/// One proposed, independently executable mutation against a workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationAction {
    pub id: Uuid,
    pub strategy: String,
    pub workload: String,
    pub namespace: String,
    pub action_type: ActionType,
    pub current_state: HashMap<String, serde_json::Value>,
    pub target_state: HashMap<String, serde_json::Value>,
    /// Estimated savings in $/month, never negative
    pub estimated_savings: f64,
    pub risk_level: RiskLevel,
    /// Analytics confidence in [0, 1]
    pub confidence: f64,
    pub prerequisite_checks: Vec<String>,
    pub rollback_plan: RollbackPlan,
    pub created_at: DateTime<Utc>,
    pub status: ActionStatus,
}

impl OptimizationAction {
    /// Advance the lifecycle status, rejecting illegal transitions
    pub fn advance(&mut self, next: ActionStatus) -> Result<(), OptimizerError> {
        if !self.status.can_transition(next) {
            return Err(OptimizerError::Validation(format!(
                "illegal status transition {} -> {} for action {}",
                self.status, next, self.id
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// An ordered batch of actions produced by analyzing a cluster
///
/// Immutable once created except for `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationPlan {
    pub id: Uuid,
    pub cluster_id: String,
    pub created_at: DateTime<Utc>,
    pub actions: Vec<OptimizationAction>,
    pub estimated_savings: f64,
    pub risk_assessment: RiskLevel,
    pub required_safety_checks: Vec<String>,
    pub status: ActionStatus,
}

/// Outcome of executing a plan, append-only once finalized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub execution_id: Uuid,
    pub plan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub successful_actions: usize,
    pub failed_actions: usize,
    /// Prorated from the plan estimate, not re-measured
    pub actual_savings: f64,
    pub rollback_count: usize,
    pub execution_log: Vec<String>,
    pub status: ActionStatus,
    pub dry_run: bool,
}

/// Result of a single named safety check, never mutated after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyCheckResult {
    pub check_name: String,
    pub passed: bool,
    pub detail: String,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Finalized record of one zero-pod scaling cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingResult {
    pub action_id: Uuid,
    pub workload: String,
    pub namespace: String,
    pub original_replicas: i32,
    pub target_replicas: i32,
    pub success: bool,
    pub verification_passed: bool,
    pub rollback_required: bool,
    pub rollback_succeeded: Option<bool>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// New request/limit pair for one resource dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub resource: String,
    pub old_request: String,
    pub new_request: String,
    pub new_limit: String,
}

/// Finalized record of one rightsizing cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RightsizingResult {
    pub action_id: Uuid,
    pub workload: String,
    pub namespace: String,
    pub changes: Vec<ResourceChange>,
    pub success: bool,
    pub verification_passed: bool,
    pub rollback_required: bool,
    pub rollback_succeeded: Option<bool>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Per-category savings from a cost optimization pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSavingsBreakdown {
    pub instance: f64,
    pub storage: f64,
    pub network: f64,
    pub autoscaling: f64,
}

impl CostSavingsBreakdown {
    pub fn total(&self) -> f64 {
        self.instance + self.storage + self.network + self.autoscaling
    }
}

/// Finalized record of one cost optimization cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostOptimizationResult {
    pub action_id: Uuid,
    pub workload: String,
    pub namespace: String,
    pub current_monthly_cost: f64,
    pub optimized_monthly_cost: f64,
    pub savings: CostSavingsBreakdown,
    pub success: bool,
    pub verification_passed: bool,
    pub rollback_required: bool,
    pub rollback_succeeded: Option<bool>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Observed usage features for one workload, supplied by analytics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadUsage {
    pub workload: String,
    pub namespace: String,
    pub cpu_utilization_percent: f64,
    pub memory_utilization_percent: f64,
    pub cpu_usage_cores: f64,
    pub memory_usage_bytes: u64,
    pub cpu_request_cores: f64,
    pub memory_request_bytes: u64,
    #[serde(with = "duration_secs")]
    pub idle_duration: Duration,
    pub replicas: i32,
    /// Current estimated monthly cost of the workload
    pub monthly_cost: f64,
}

/// Opaque scores from the analytics/ML boundary
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Prediction {
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Prediction value in [0, 1]
    pub prediction_value: f64,
}

/// Serde helper: Duration as whole seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
