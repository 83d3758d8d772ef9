//! Workload Optimizer - safe, reversible cost optimization for Kubernetes
//!
//! This binary connects to the cluster, wires the optimization engine with
//! its strategy executors and safety manager, and serves health, metrics,
//! and reporting endpoints.

use anyhow::Result;
use optimizer_lib::{
    analytics::HeuristicProvider,
    cluster::{ClusterOps, KubeCluster},
    cost::{CostModel, FixedPricing},
    engine::{OptimizationEngine, PolicyConfig},
    exec::{
        CostOptimizationConfig, CostOptimizer, Executor, ResourceRightsizer, RightsizingConfig,
        ScalingConfig, ZeroPodScaler,
    },
    health::{components, HealthRegistry},
    observability::{OptimizerMetrics, StructuredLogger},
    safety::{SafetyConfig, SafetyManager},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const OPTIMIZER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting workload-optimizer");

    // Load configuration
    let config = config::OptimizerConfig::load()?;
    info!(cluster_id = %config.cluster_id, dry_run = config.dry_run, "Optimizer configured");

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CLUSTER).await;
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::SAFETY).await;

    // Initialize metrics and structured logging
    let metrics = OptimizerMetrics::new();
    let logger = StructuredLogger::new(&config.cluster_id);
    logger.log_startup(OPTIMIZER_VERSION);

    // Connect to the cluster
    let cluster: Arc<dyn ClusterOps> = match KubeCluster::connect().await {
        Ok(c) => Arc::new(c),
        Err(e) => {
            health_registry
                .set_unhealthy(components::CLUSTER, e.to_string())
                .await;
            return Err(e.into());
        }
    };

    // Wire the safety manager and strategy executors
    let safety = Arc::new(SafetyManager::new(cluster.clone(), SafetyConfig::default()));
    let cost_model: Arc<dyn CostModel> = Arc::new(FixedPricing::default());
    let verification_delay = Duration::from_secs(config.verification_delay_secs);

    let zero_pod = Arc::new(ZeroPodScaler::new(
        cluster.clone(),
        safety.clone(),
        ScalingConfig {
            verification_delay,
            ..ScalingConfig::default()
        },
    ));
    let rightsizer = Arc::new(ResourceRightsizer::new(
        cluster.clone(),
        safety.clone(),
        RightsizingConfig::default(),
    ));
    let cost_optimizer = Arc::new(CostOptimizer::new(
        cluster.clone(),
        safety.clone(),
        cost_model.clone(),
        CostOptimizationConfig {
            cost_threshold: config.cost_threshold,
            ..CostOptimizationConfig::default()
        },
    ));

    // Analytics boundary: the heuristic provider stands in until an
    // external prediction service is wired up
    let analytics = Arc::new(HeuristicProvider::new(Vec::new()));

    let engine = Arc::new(OptimizationEngine::new(
        analytics,
        safety.clone(),
        vec![
            Executor::ZeroPod(zero_pod.clone()),
            Executor::Rightsize(rightsizer.clone()),
            Executor::CostOptimize(cost_optimizer.clone()),
        ],
        cost_model,
        PolicyConfig::default(),
    ));

    // Create shared application state
    let app_state = Arc::new(api::AppState {
        health_registry: health_registry.clone(),
        metrics: metrics.clone(),
        engine,
        safety,
        zero_pod,
        rightsizer,
        cost_optimizer,
    });

    // Mark optimizer as ready after initialization
    health_registry.set_ready(true).await;

    // Start health, metrics, and reporting server
    let _api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
