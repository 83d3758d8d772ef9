//! Observability infrastructure for the workload optimizer
//!
//! Provides:
//! - Prometheus metrics (plan/action counters, rollback counter, execution
//!   latency, active operations, estimated savings)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_gauge, Gauge,
    Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for action execution latency (in seconds)
const EXECUTION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OptimizerMetricsInner> = OnceLock::new();

struct OptimizerMetricsInner {
    plans_created: IntCounter,
    actions_executed: IntCounter,
    actions_succeeded: IntCounter,
    actions_failed: IntCounter,
    rollbacks_performed: IntCounter,
    safety_checks_run: IntCounter,
    safety_checks_failed: IntCounter,
    action_execution_seconds: Histogram,
    active_operations: IntGauge,
    estimated_savings_dollars: Gauge,
}

impl OptimizerMetricsInner {
    fn new() -> Self {
        Self {
            plans_created: register_int_counter!(
                "optimizer_plans_created_total",
                "Total number of optimization plans created"
            )
            .expect("Failed to register plans_created"),

            actions_executed: register_int_counter!(
                "optimizer_actions_executed_total",
                "Total number of optimization actions executed"
            )
            .expect("Failed to register actions_executed"),

            actions_succeeded: register_int_counter!(
                "optimizer_actions_succeeded_total",
                "Total number of optimization actions that completed successfully"
            )
            .expect("Failed to register actions_succeeded"),

            actions_failed: register_int_counter!(
                "optimizer_actions_failed_total",
                "Total number of optimization actions that failed"
            )
            .expect("Failed to register actions_failed"),

            rollbacks_performed: register_int_counter!(
                "optimizer_rollbacks_performed_total",
                "Total number of rollbacks performed after failed verification"
            )
            .expect("Failed to register rollbacks_performed"),

            safety_checks_run: register_int_counter!(
                "optimizer_safety_checks_run_total",
                "Total number of safety checks executed"
            )
            .expect("Failed to register safety_checks_run"),

            safety_checks_failed: register_int_counter!(
                "optimizer_safety_checks_failed_total",
                "Total number of safety checks that failed"
            )
            .expect("Failed to register safety_checks_failed"),

            action_execution_seconds: register_histogram!(
                "optimizer_action_execution_seconds",
                "Wall-clock time spent executing one optimization action",
                EXECUTION_BUCKETS.to_vec()
            )
            .expect("Failed to register action_execution_seconds"),

            active_operations: register_int_gauge!(
                "optimizer_active_operations",
                "Number of optimization actions currently in flight"
            )
            .expect("Failed to register active_operations"),

            estimated_savings_dollars: register_gauge!(
                "optimizer_estimated_savings_dollars",
                "Estimated monthly savings of the most recent plan"
            )
            .expect("Failed to register estimated_savings_dollars"),
        }
    }
}

/// Optimizer metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// underlying metrics.
#[derive(Clone)]
pub struct OptimizerMetrics {
    _private: (),
}

impl Default for OptimizerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OptimizerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_plans_created(&self) {
        self.inner().plans_created.inc();
    }

    pub fn record_action(&self, success: bool, rolled_back: bool, duration_secs: f64) {
        let inner = self.inner();
        inner.actions_executed.inc();
        if success {
            inner.actions_succeeded.inc();
        } else {
            inner.actions_failed.inc();
        }
        if rolled_back {
            inner.rollbacks_performed.inc();
        }
        inner.action_execution_seconds.observe(duration_secs);
    }

    pub fn record_safety_checks(&self, run: u64, failed: u64) {
        self.inner().safety_checks_run.inc_by(run);
        self.inner().safety_checks_failed.inc_by(failed);
    }

    pub fn set_active_operations(&self, count: i64) {
        self.inner().active_operations.set(count);
    }

    pub fn set_estimated_savings(&self, dollars: f64) {
        self.inner().estimated_savings_dollars.set(dollars);
    }
}

/// Structured logger for optimizer events
///
/// Emits consistent JSON-formatted records for plan creation, action
/// execution, safety gating, and rollbacks.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_id: String,
}

impl StructuredLogger {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
        }
    }

    pub fn log_plan_created(
        &self,
        plan_id: &str,
        action_count: usize,
        estimated_savings: f64,
        risk: &str,
    ) {
        info!(
            event = "plan_created",
            cluster = %self.cluster_id,
            plan_id = %plan_id,
            actions = action_count,
            estimated_savings = estimated_savings,
            risk = %risk,
            "Created optimization plan"
        );
    }

    pub fn log_action_executed(
        &self,
        action_id: &str,
        action_type: &str,
        workload: &str,
        namespace: &str,
        success: bool,
        rollback_required: bool,
    ) {
        if success {
            info!(
                event = "action_executed",
                cluster = %self.cluster_id,
                action_id = %action_id,
                action_type = %action_type,
                workload = %workload,
                namespace = %namespace,
                success = true,
                "Optimization action completed"
            );
        } else {
            warn!(
                event = "action_executed",
                cluster = %self.cluster_id,
                action_id = %action_id,
                action_type = %action_type,
                workload = %workload,
                namespace = %namespace,
                success = false,
                rollback_required = rollback_required,
                "Optimization action failed"
            );
        }
    }

    pub fn log_rollback(&self, action_id: &str, workload: &str, succeeded: bool) {
        if succeeded {
            info!(
                event = "rollback",
                cluster = %self.cluster_id,
                action_id = %action_id,
                workload = %workload,
                succeeded = true,
                "Rollback restored original state"
            );
        } else {
            warn!(
                event = "rollback",
                cluster = %self.cluster_id,
                action_id = %action_id,
                workload = %workload,
                succeeded = false,
                "Rollback failed; original state not restored"
            );
        }
    }

    pub fn log_execution_finished(
        &self,
        execution_id: &str,
        successful: usize,
        failed: usize,
        rollbacks: usize,
        actual_savings: f64,
        dry_run: bool,
    ) {
        info!(
            event = "plan_executed",
            cluster = %self.cluster_id,
            execution_id = %execution_id,
            successful = successful,
            failed = failed,
            rollbacks = rollbacks,
            actual_savings = actual_savings,
            dry_run = dry_run,
            "Plan execution finished"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "optimizer_started",
            cluster = %self.cluster_id,
            version = %version,
            "Workload optimizer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "optimizer_shutdown",
            cluster = %self.cluster_id,
            reason = %reason,
            "Workload optimizer shutting down"
        );
    }
}
