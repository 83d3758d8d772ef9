//! Action proposal policy
//!
//! Deterministic rules that turn usage features and prediction scores into
//! proposed actions. A workload can receive one proposal per action type in
//! the same plan; proposals are never deduplicated across types.

use crate::cost::CostModel;
use crate::models::{
    ActionStatus, ActionType, OptimizationAction, Prediction, RiskLevel, RollbackOp, RollbackPlan,
    WorkloadUsage,
};
use crate::safety::check_names;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Thresholds for the proposal rules
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Idle time required before proposing scale-to-zero
    pub idle_threshold: Duration,
    /// Confidence required before proposing scale-to-zero
    pub confidence_threshold: f64,
    /// CPU utilization below which rightsizing is proposed
    pub cpu_utilization_threshold: f64,
    /// Memory utilization below which rightsizing is proposed
    pub memory_utilization_threshold: f64,
    /// Prediction value above which cost optimization is proposed
    pub prediction_threshold: f64,
    /// Share of medium-risk actions that lifts a plan to medium risk
    pub medium_risk_ratio: f64,
    /// Headroom multiplier for rightsizing estimates
    pub safety_margin: f64,
    /// Request floors for rightsizing estimates
    pub min_cpu_cores: f64,
    pub min_memory_bytes: u64,
    /// Fraction of a workload's cost the cost strategy can reclaim
    pub cost_reduction_estimate: f64,
    /// Timeout embedded in proposed rollback plans
    pub rollback_timeout: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(4 * 3600),
            confidence_threshold: 0.8,
            cpu_utilization_threshold: 30.0,
            memory_utilization_threshold: 40.0,
            prediction_threshold: 0.6,
            medium_risk_ratio: 0.3,
            safety_margin: 0.20,
            min_cpu_cores: 0.1,
            min_memory_bytes: 64 * 1024 * 1024,
            cost_reduction_estimate: 0.5,
            rollback_timeout: Duration::from_secs(300),
        }
    }
}

/// Applies the proposal rules for one cluster analysis
pub struct ProposalPolicy {
    config: PolicyConfig,
    cost_model: Arc<dyn CostModel>,
}

impl ProposalPolicy {
    pub fn new(config: PolicyConfig, cost_model: Arc<dyn CostModel>) -> Self {
        Self { config, cost_model }
    }

    /// All actions the rules emit for one workload
    pub fn propose(
        &self,
        usage: &WorkloadUsage,
        prediction: &Prediction,
    ) -> Vec<OptimizationAction> {
        let mut actions = Vec::new();

        if usage.idle_duration > self.config.idle_threshold
            && prediction.confidence > self.config.confidence_threshold
        {
            actions.push(self.propose_scale_to_zero(usage, prediction));
        }

        if usage.cpu_utilization_percent < self.config.cpu_utilization_threshold
            || usage.memory_utilization_percent < self.config.memory_utilization_threshold
        {
            actions.push(self.propose_rightsize(usage, prediction));
        }

        if prediction.prediction_value > self.config.prediction_threshold {
            actions.push(self.propose_cost_optimize(usage, prediction));
        }

        actions
    }

    fn base_action(
        &self,
        usage: &WorkloadUsage,
        prediction: &Prediction,
        strategy: &str,
        action_type: ActionType,
        risk_level: RiskLevel,
    ) -> OptimizationAction {
        OptimizationAction {
            id: Uuid::new_v4(),
            strategy: strategy.to_string(),
            workload: usage.workload.clone(),
            namespace: usage.namespace.clone(),
            action_type,
            current_state: HashMap::new(),
            target_state: HashMap::new(),
            estimated_savings: 0.0,
            risk_level,
            confidence: prediction.confidence,
            prerequisite_checks: vec![
                check_names::CLUSTER_HEALTH.to_string(),
                check_names::WORKLOAD_HEALTH.to_string(),
                check_names::RESOURCE_AVAILABILITY.to_string(),
            ],
            rollback_plan: RollbackPlan {
                original_state: HashMap::new(),
                operations: Vec::new(),
                verification_checks: vec![check_names::WORKLOAD_HEALTH.to_string()],
                timeout: self.config.rollback_timeout,
            },
            created_at: Utc::now(),
            status: ActionStatus::Pending,
        }
    }

    fn workload_cost(&self, usage: &WorkloadUsage) -> f64 {
        if usage.monthly_cost > 0.0 {
            usage.monthly_cost
        } else {
            self.cost_model
                .monthly_cost(usage.cpu_request_cores, usage.memory_request_bytes)
                * usage.replicas.max(0) as f64
        }
    }

    fn propose_scale_to_zero(
        &self,
        usage: &WorkloadUsage,
        prediction: &Prediction,
    ) -> OptimizationAction {
        let mut action = self.base_action(
            usage,
            prediction,
            "zero_pod_scaling",
            ActionType::ScaleToZero,
            RiskLevel::Medium,
        );

        // Scaling to zero reclaims the workload's entire request footprint
        action.estimated_savings = self.workload_cost(usage);
        action.current_state =
            HashMap::from([("replicas".to_string(), serde_json::json!(usage.replicas))]);
        action.target_state = HashMap::from([("replicas".to_string(), serde_json::json!(0))]);
        action.rollback_plan.original_state = action.current_state.clone();
        action.rollback_plan.operations = vec![RollbackOp::ScaleReplicas {
            replicas: usage.replicas,
        }];
        action
    }

    fn propose_rightsize(
        &self,
        usage: &WorkloadUsage,
        prediction: &Prediction,
    ) -> OptimizationAction {
        let mut action = self.base_action(
            usage,
            prediction,
            "resource_rightsizing",
            ActionType::Rightsize,
            RiskLevel::Low,
        );

        let optimized_cpu = (usage.cpu_usage_cores * (1.0 + self.config.safety_margin))
            .max(self.config.min_cpu_cores);
        let optimized_memory = ((usage.memory_usage_bytes as f64
            * (1.0 + self.config.safety_margin)) as u64)
            .max(self.config.min_memory_bytes);

        // Resource-delta cost model: the difference between current and
        // optimized requests, priced out monthly across replicas
        let current_cost = self
            .cost_model
            .monthly_cost(usage.cpu_request_cores, usage.memory_request_bytes)
            * usage.replicas.max(0) as f64;
        let optimized_cost = self
            .cost_model
            .monthly_cost(optimized_cpu, optimized_memory)
            * usage.replicas.max(0) as f64;
        action.estimated_savings = (current_cost - optimized_cost).max(0.0);

        action.current_state = HashMap::from([
            (
                "cpu_request_cores".to_string(),
                serde_json::json!(usage.cpu_request_cores),
            ),
            (
                "memory_request_bytes".to_string(),
                serde_json::json!(usage.memory_request_bytes),
            ),
        ]);
        action.target_state = HashMap::from([
            (
                "cpu_request_cores".to_string(),
                serde_json::json!(optimized_cpu),
            ),
            (
                "memory_request_bytes".to_string(),
                serde_json::json!(optimized_memory),
            ),
        ]);
        action.rollback_plan.original_state = action.current_state.clone();
        action.rollback_plan.operations = vec![RollbackOp::RestoreResources {
            requests: HashMap::from([
                (
                    "cpu".to_string(),
                    crate::cluster::format_cpu_quantity(usage.cpu_request_cores),
                ),
                (
                    "memory".to_string(),
                    crate::cluster::format_memory_quantity(usage.memory_request_bytes),
                ),
            ]),
            limits: HashMap::new(),
        }];
        action
    }

    fn propose_cost_optimize(
        &self,
        usage: &WorkloadUsage,
        prediction: &Prediction,
    ) -> OptimizationAction {
        let mut action = self.base_action(
            usage,
            prediction,
            "cost_optimization",
            ActionType::CostOptimize,
            RiskLevel::Low,
        );

        let current_cost = self.workload_cost(usage);
        let optimized_cost = current_cost * (1.0 - self.config.cost_reduction_estimate);
        action.estimated_savings = current_cost - optimized_cost;
        action.current_state = HashMap::from([(
            "monthly_cost".to_string(),
            serde_json::json!(current_cost),
        )]);
        action.target_state = HashMap::from([(
            "monthly_cost".to_string(),
            serde_json::json!(optimized_cost),
        )]);
        action.rollback_plan.original_state = action.current_state.clone();
        action.rollback_plan.operations = vec![RollbackOp::RestoreConfiguration];
        action
    }
}

/// Plan-level risk from its actions: high wins outright, medium wins when
/// more than `medium_ratio` of the actions carry it
pub fn aggregate_risk(actions: &[OptimizationAction], medium_ratio: f64) -> RiskLevel {
    if actions.iter().any(|a| a.risk_level == RiskLevel::High) {
        return RiskLevel::High;
    }
    if actions.is_empty() {
        return RiskLevel::Low;
    }
    let medium = actions
        .iter()
        .filter(|a| a.risk_level == RiskLevel::Medium)
        .count();
    if medium as f64 / actions.len() as f64 > medium_ratio {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::FixedPricing;

    fn policy() -> ProposalPolicy {
        ProposalPolicy::new(PolicyConfig::default(), Arc::new(FixedPricing::default()))
    }

    fn usage(idle_hours: u64, cpu_pct: f64, mem_pct: f64) -> WorkloadUsage {
        WorkloadUsage {
            workload: "idle-svc".to_string(),
            namespace: "default".to_string(),
            cpu_utilization_percent: cpu_pct,
            memory_utilization_percent: mem_pct,
            cpu_usage_cores: 0.05,
            memory_usage_bytes: 64 * 1024 * 1024,
            cpu_request_cores: 0.5,
            memory_request_bytes: 512 * 1024 * 1024,
            idle_duration: Duration::from_secs(idle_hours * 3600),
            replicas: 3,
            monthly_cost: 0.0,
        }
    }

    #[test]
    fn test_idle_confident_workload_gets_scale_to_zero() {
        let actions = policy().propose(
            &usage(6, 50.0, 50.0),
            &Prediction {
                confidence: 0.9,
                prediction_value: 0.3,
            },
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::ScaleToZero);
        assert_eq!(actions[0].risk_level, RiskLevel::Medium);
        assert!(actions[0].estimated_savings > 0.0);
    }

    #[test]
    fn test_low_confidence_blocks_scale_to_zero() {
        let actions = policy().propose(
            &usage(6, 50.0, 50.0),
            &Prediction {
                confidence: 0.7,
                prediction_value: 0.3,
            },
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_rightsize_is_confidence_independent() {
        let actions = policy().propose(
            &usage(0, 20.0, 50.0),
            &Prediction {
                confidence: 0.1,
                prediction_value: 0.2,
            },
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Rightsize);
        assert_eq!(actions[0].risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_memory_threshold_alone_triggers_rightsize() {
        let actions = policy().propose(
            &usage(0, 80.0, 35.0),
            &Prediction {
                confidence: 0.5,
                prediction_value: 0.1,
            },
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Rightsize);
    }

    #[test]
    fn test_one_workload_can_receive_all_three_proposals() {
        let actions = policy().propose(
            &usage(6, 10.0, 10.0),
            &Prediction {
                confidence: 0.95,
                prediction_value: 0.8,
            },
        );
        assert_eq!(actions.len(), 3);
        let types: Vec<_> = actions.iter().map(|a| a.action_type).collect();
        assert!(types.contains(&ActionType::ScaleToZero));
        assert!(types.contains(&ActionType::Rightsize));
        assert!(types.contains(&ActionType::CostOptimize));
    }

    #[test]
    fn test_rollback_plans_are_built_at_proposal_time() {
        let actions = policy().propose(
            &usage(6, 10.0, 10.0),
            &Prediction {
                confidence: 0.95,
                prediction_value: 0.8,
            },
        );
        for action in &actions {
            assert!(
                !action.rollback_plan.operations.is_empty(),
                "{} proposal lacks rollback operations",
                action.action_type
            );
        }
        let scale = actions
            .iter()
            .find(|a| a.action_type == ActionType::ScaleToZero)
            .unwrap();
        assert_eq!(
            scale.rollback_plan.operations[0],
            RollbackOp::ScaleReplicas { replicas: 3 }
        );
    }

    #[test]
    fn test_rightsize_estimate_respects_floors() {
        let mut idle = usage(0, 5.0, 5.0);
        idle.cpu_usage_cores = 0.0;
        idle.memory_usage_bytes = 0;
        let actions = policy().propose(
            &idle,
            &Prediction {
                confidence: 0.5,
                prediction_value: 0.1,
            },
        );
        let rightsize = &actions[0];
        let target_cpu = rightsize.target_state["cpu_request_cores"].as_f64().unwrap();
        let target_mem = rightsize.target_state["memory_request_bytes"]
            .as_u64()
            .unwrap();
        assert!((target_cpu - 0.1).abs() < 1e-9);
        assert_eq!(target_mem, 64 * 1024 * 1024);
    }

    fn action_with_risk(risk: RiskLevel) -> OptimizationAction {
        let p = policy();
        let mut action = p.propose_scale_to_zero(
            &usage(6, 50.0, 50.0),
            &Prediction {
                confidence: 0.9,
                prediction_value: 0.5,
            },
        );
        action.risk_level = risk;
        action
    }

    #[test]
    fn test_any_high_risk_dominates() {
        let mut actions: Vec<_> = (0..10).map(|_| action_with_risk(RiskLevel::Low)).collect();
        actions.push(action_with_risk(RiskLevel::High));
        assert_eq!(aggregate_risk(&actions, 0.3), RiskLevel::High);
    }

    #[test]
    fn test_forty_percent_medium_is_medium() {
        let mut actions: Vec<_> = (0..6).map(|_| action_with_risk(RiskLevel::Low)).collect();
        actions.extend((0..4).map(|_| action_with_risk(RiskLevel::Medium)));
        assert_eq!(aggregate_risk(&actions, 0.3), RiskLevel::Medium);
    }

    #[test]
    fn test_twenty_percent_medium_is_low() {
        let mut actions: Vec<_> = (0..8).map(|_| action_with_risk(RiskLevel::Low)).collect();
        actions.extend((0..2).map(|_| action_with_risk(RiskLevel::Medium)));
        assert_eq!(aggregate_risk(&actions, 0.3), RiskLevel::Low);
    }

    #[test]
    fn test_empty_plan_is_low_risk() {
        assert_eq!(aggregate_risk(&[], 0.3), RiskLevel::Low);
    }
}
