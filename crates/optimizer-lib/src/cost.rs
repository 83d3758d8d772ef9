//! Pricing model for savings estimation
//!
//! Savings math is deliberately behind a trait: the fixed per-core and
//! per-gigabyte rates below are placeholders, and real deployments swap in
//! provider-specific pricing.

use std::collections::HashMap;

use crate::cluster::{parse_cpu_quantity, parse_memory_quantity};

/// Billing hours in a month
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Converts resource quantities into $/month
pub trait CostModel: Send + Sync {
    /// Monthly cost of the given resources for a single replica
    fn monthly_cost(&self, cpu_cores: f64, memory_bytes: u64) -> f64;

    /// Monthly cost of a workload's resource requests across its replicas
    fn workload_monthly_cost(&self, requests: &HashMap<String, String>, replicas: i32) -> f64 {
        let cpu_cores = requests
            .get("cpu")
            .map(|q| parse_cpu_quantity(q) as f64 / 1000.0)
            .unwrap_or(0.0);
        let memory_bytes = requests
            .get("memory")
            .map(|q| parse_memory_quantity(q))
            .unwrap_or(0);
        self.monthly_cost(cpu_cores, memory_bytes) * replicas.max(0) as f64
    }
}

/// Flat per-unit pricing
#[derive(Debug, Clone)]
pub struct FixedPricing {
    /// $ per core-hour
    pub cpu_core_hour: f64,
    /// $ per GB-hour
    pub memory_gb_hour: f64,
}

impl Default for FixedPricing {
    fn default() -> Self {
        Self {
            cpu_core_hour: 0.0425,
            memory_gb_hour: 0.0047,
        }
    }
}

impl CostModel for FixedPricing {
    fn monthly_cost(&self, cpu_cores: f64, memory_bytes: u64) -> f64 {
        let memory_gb = memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        (cpu_cores * self.cpu_core_hour + memory_gb * self.memory_gb_hour) * HOURS_PER_MONTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_cost_scales_with_resources() {
        let pricing = FixedPricing::default();
        let one_core = pricing.monthly_cost(1.0, 0);
        let two_cores = pricing.monthly_cost(2.0, 0);
        assert!((two_cores - 2.0 * one_core).abs() < 1e-9);
        assert!((one_core - 0.0425 * HOURS_PER_MONTH).abs() < 1e-9);
    }

    #[test]
    fn test_workload_cost_multiplies_replicas() {
        let pricing = FixedPricing::default();
        let requests = HashMap::from([
            ("cpu".to_string(), "500m".to_string()),
            ("memory".to_string(), "1Gi".to_string()),
        ]);
        let single = pricing.workload_monthly_cost(&requests, 1);
        let triple = pricing.workload_monthly_cost(&requests, 3);
        assert!((triple - 3.0 * single).abs() < 1e-9);
    }

    #[test]
    fn test_missing_requests_cost_nothing() {
        let pricing = FixedPricing::default();
        assert_eq!(pricing.workload_monthly_cost(&HashMap::new(), 5), 0.0);
    }
}
