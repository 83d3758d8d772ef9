//! Optimizer service configuration

use anyhow::Result;
use serde::Deserialize;

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    /// Identifier of the cluster this optimizer manages
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    /// API server port for health/metrics/reporting
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Whether plan execution defaults to dry-run
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Settle delay before post-mutation verification, in seconds
    #[serde(default = "default_verification_delay")]
    pub verification_delay_secs: u64,

    /// Minimum $/month savings before a cost action mutates
    #[serde(default = "default_cost_threshold")]
    pub cost_threshold: f64,
}

fn default_cluster_id() -> String {
    std::env::var("CLUSTER_ID").unwrap_or_else(|_| "default-cluster".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_dry_run() -> bool {
    true
}

fn default_verification_delay() -> u64 {
    60
}

fn default_cost_threshold() -> f64 {
    100.0
}

impl OptimizerConfig {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("OPTIMIZER"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| OptimizerConfig {
            cluster_id: default_cluster_id(),
            api_port: default_api_port(),
            dry_run: default_dry_run(),
            verification_delay_secs: default_verification_delay(),
            cost_threshold: default_cost_threshold(),
        }))
    }
}
