//! Optimization engine
//!
//! Top-level orchestrator: analyzes a cluster into an ordered plan of
//! actions, executes the plan by dispatching each action to its executor,
//! aggregates the outcome, and owns rollback escalation and execution
//! history. One action's failure never aborts the rest of the plan.

mod policy;

pub use policy::{aggregate_risk, PolicyConfig, ProposalPolicy};

use crate::analytics::PredictionProvider;
use crate::cost::CostModel;
use crate::error::{OptimizerError, Result};
use crate::exec::Executor;
use crate::models::{ActionStatus, OptimizationPlan, OptimizationResult};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use crate::safety::SafetyManager;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Aggregate engine counters for dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub total_plans: usize,
    pub total_executions: usize,
    pub successful_actions: usize,
    pub failed_actions: usize,
    pub rollback_count: usize,
    pub total_actual_savings: f64,
    pub average_execution_secs: f64,
}

/// Orchestrates analysis, plan execution, and history
pub struct OptimizationEngine {
    analytics: Arc<dyn PredictionProvider>,
    safety: Arc<SafetyManager>,
    executors: Vec<Executor>,
    policy: ProposalPolicy,
    medium_risk_ratio: f64,
    plans: RwLock<HashMap<Uuid, OptimizationPlan>>,
    history: RwLock<Vec<OptimizationResult>>,
    metrics: OptimizerMetrics,
    logger: StructuredLogger,
}

impl OptimizationEngine {
    pub fn new(
        analytics: Arc<dyn PredictionProvider>,
        safety: Arc<SafetyManager>,
        executors: Vec<Executor>,
        cost_model: Arc<dyn CostModel>,
        policy_config: PolicyConfig,
    ) -> Self {
        let medium_risk_ratio = policy_config.medium_risk_ratio;
        Self {
            analytics,
            safety,
            executors,
            policy: ProposalPolicy::new(policy_config, cost_model),
            medium_risk_ratio,
            plans: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
            metrics: OptimizerMetrics::new(),
            logger: StructuredLogger::new("optimizer"),
        }
    }

    /// Analyze a cluster and produce an ordered optimization plan
    ///
    /// Usage features and prediction scores come from the analytics
    /// boundary; the proposal policy turns them into actions. The plan is
    /// stored and owned by the engine for its entire lifetime.
    pub async fn analyze_cluster(&self, cluster_id: &str) -> Result<OptimizationPlan> {
        let usage_rows = self.analytics.workload_usage(cluster_id).await?;
        info!(
            cluster_id = %cluster_id,
            workloads = usage_rows.len(),
            "Analyzing cluster"
        );

        let mut actions = Vec::new();
        for usage in &usage_rows {
            let prediction = match self.analytics.predict(usage).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(
                        workload = %usage.workload,
                        namespace = %usage.namespace,
                        error = %e,
                        "Prediction unavailable, skipping workload"
                    );
                    continue;
                }
            };
            actions.extend(self.policy.propose(usage, &prediction));
        }

        let estimated_savings: f64 = actions.iter().map(|a| a.estimated_savings).sum();
        let risk_assessment = aggregate_risk(&actions, self.medium_risk_ratio);

        let plan = OptimizationPlan {
            id: Uuid::new_v4(),
            cluster_id: cluster_id.to_string(),
            created_at: Utc::now(),
            actions,
            estimated_savings,
            risk_assessment,
            required_safety_checks: self
                .safety
                .registered_checks()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            status: ActionStatus::Pending,
        };

        self.logger.log_plan_created(
            &plan.id.to_string(),
            plan.actions.len(),
            plan.estimated_savings,
            &format!("{:?}", plan.risk_assessment).to_lowercase(),
        );
        self.metrics.inc_plans_created();
        self.metrics.set_estimated_savings(plan.estimated_savings);

        self.plans.write().await.insert(plan.id, plan.clone());
        Ok(plan)
    }

    /// Execute a stored plan, sequentially and in proposal order
    ///
    /// In dry-run mode no mutation occurs and every action is logged as a
    /// simulated success. In live mode each action is dispatched to its
    /// type-matched executor; a failed action is rolled back (by the
    /// executor via the safety manager) and execution continues with the
    /// next action. Always returns a result, even when every action fails.
    pub async fn execute_plan(&self, plan_id: Uuid, dry_run: bool) -> Result<OptimizationResult> {
        let mut plan = {
            let plans = self.plans.read().await;
            plans
                .get(&plan_id)
                .cloned()
                .ok_or_else(|| OptimizerError::Validation(format!("unknown plan {}", plan_id)))?
        };

        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut log = Vec::new();
        let mut successful = 0usize;
        let mut failed = 0usize;
        let mut rollbacks = 0usize;

        if plan.status == ActionStatus::Pending {
            plan.status = ActionStatus::Executing;
        }

        log.push(format!(
            "execution {} of plan {} started ({} actions, dry_run={})",
            execution_id,
            plan_id,
            plan.actions.len(),
            dry_run
        ));

        let total = plan.actions.len();
        for action in plan.actions.iter_mut() {
            if dry_run {
                successful += 1;
                log.push(format!(
                    "[dry-run] {} {}/{}: would execute, estimated ${:.2}/month",
                    action.action_type, action.namespace, action.workload, action.estimated_savings
                ));
                continue;
            }

            let executor = self
                .executors
                .iter()
                .find(|e| e.action_type() == action.action_type);

            let executor = match executor {
                Some(e) => e,
                None => {
                    failed += 1;
                    log.push(format!(
                        "{} {}/{}: no executor registered for action type",
                        action.action_type, action.namespace, action.workload
                    ));
                    warn!(
                        action_id = %action.id,
                        action_type = %action.action_type,
                        "No executor registered for action type"
                    );
                    continue;
                }
            };

            self.metrics.set_active_operations(1);
            let outcome = executor.execute(action).await;
            self.metrics.set_active_operations(0);

            self.metrics.record_action(
                outcome.success,
                outcome.rollback_succeeded == Some(true),
                outcome.elapsed.as_secs_f64(),
            );
            self.logger.log_action_executed(
                &action.id.to_string(),
                action.action_type.as_str(),
                &action.workload,
                &action.namespace,
                outcome.success,
                outcome.rollback_required,
            );

            if outcome.success {
                successful += 1;
                log.push(format!(
                    "{} {}/{}: completed, verification passed",
                    action.action_type, action.namespace, action.workload
                ));
                continue;
            }

            failed += 1;
            let reason = outcome
                .failure_reason
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string());
            log.push(format!(
                "{} {}/{}: failed: {}",
                action.action_type, action.namespace, action.workload, reason
            ));

            // Rollback escalation: the executor already rolled back after a
            // failed verification; surface the terminal case loudly.
            if outcome.rollback_required {
                rollbacks += 1;
                let succeeded = outcome.rollback_succeeded == Some(true);
                self.logger
                    .log_rollback(&action.id.to_string(), &action.workload, succeeded);
                if succeeded {
                    log.push(format!(
                        "{} {}/{}: rollback restored original state",
                        action.action_type, action.namespace, action.workload
                    ));
                } else {
                    log.push(format!(
                        "{} {}/{}: ROLLBACK FAILED, operator attention required",
                        action.action_type, action.namespace, action.workload
                    ));
                    error!(
                        action_id = %action.id,
                        workload = %action.workload,
                        namespace = %action.namespace,
                        "Rollback failed; workload left in unverified state"
                    );
                }
            }
        }

        // Conservative proration of the estimate, not a re-measurement
        let actual_savings = if total > 0 {
            plan.estimated_savings * successful as f64 / total as f64
        } else {
            0.0
        };

        plan.status = if total > 0 && successful == 0 && !dry_run {
            ActionStatus::Failed
        } else {
            ActionStatus::Completed
        };

        let result = OptimizationResult {
            execution_id,
            plan_id,
            started_at,
            finished_at: Utc::now(),
            successful_actions: successful,
            failed_actions: failed,
            actual_savings,
            rollback_count: rollbacks,
            execution_log: log,
            status: plan.status,
            dry_run,
        };

        self.logger.log_execution_finished(
            &execution_id.to_string(),
            successful,
            failed,
            rollbacks,
            actual_savings,
            dry_run,
        );

        // Persist the plan's final action statuses alongside the result
        self.plans.write().await.insert(plan_id, plan);
        self.history.write().await.push(result.clone());
        Ok(result)
    }

    /// Look up a stored plan by id
    pub async fn get_plan(&self, plan_id: Uuid) -> Option<OptimizationPlan> {
        self.plans.read().await.get(&plan_id).cloned()
    }

    /// All plans the engine currently owns
    pub async fn plans(&self) -> Vec<OptimizationPlan> {
        self.plans.read().await.values().cloned().collect()
    }

    /// Finalized execution results, oldest first
    pub async fn execution_history(&self) -> Vec<OptimizationResult> {
        self.history.read().await.clone()
    }

    /// Aggregate snapshot for dashboards
    pub async fn get_optimization_metrics(&self) -> EngineMetrics {
        let plans = self.plans.read().await;
        let history = self.history.read().await;

        let successful_actions = history.iter().map(|r| r.successful_actions).sum();
        let failed_actions = history.iter().map(|r| r.failed_actions).sum();
        let rollback_count = history.iter().map(|r| r.rollback_count).sum();
        let total_actual_savings = history.iter().map(|r| r.actual_savings).sum();
        let average_execution_secs = if history.is_empty() {
            0.0
        } else {
            history
                .iter()
                .map(|r| {
                    (r.finished_at - r.started_at)
                        .to_std()
                        .unwrap_or_default()
                        .as_secs_f64()
                })
                .sum::<f64>()
                / history.len() as f64
        };

        EngineMetrics {
            total_plans: plans.len(),
            total_executions: history.len(),
            successful_actions,
            failed_actions,
            rollback_count,
            total_actual_savings,
            average_execution_secs,
        }
    }
}
