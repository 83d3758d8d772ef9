//! Analytics and prediction boundary
//!
//! Usage features and prediction scores are supplied externally; the engine
//! treats them as opaque inputs to the proposal policy and never blocks on
//! how they are computed.

use crate::error::Result;
use crate::models::{Prediction, WorkloadUsage};
use async_trait::async_trait;

/// Source of per-workload usage features and prediction scores
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    /// Usage features for every workload in the cluster under analysis
    async fn workload_usage(&self, cluster_id: &str) -> Result<Vec<WorkloadUsage>>;

    /// Opaque confidence and prediction scores for one workload
    async fn predict(&self, usage: &WorkloadUsage) -> Result<Prediction>;
}

/// Utilization-derived scoring used when no external model is wired in
///
/// Confidence grows with observed idle time; the prediction value reflects
/// how much headroom the workload's requests leave unused.
pub struct HeuristicProvider {
    usage_rows: Vec<WorkloadUsage>,
}

impl HeuristicProvider {
    pub fn new(usage_rows: Vec<WorkloadUsage>) -> Self {
        Self { usage_rows }
    }
}

#[async_trait]
impl PredictionProvider for HeuristicProvider {
    async fn workload_usage(&self, _cluster_id: &str) -> Result<Vec<WorkloadUsage>> {
        Ok(self.usage_rows.clone())
    }

    async fn predict(&self, usage: &WorkloadUsage) -> Result<Prediction> {
        let idle_hours = usage.idle_duration.as_secs_f64() / 3600.0;
        let confidence = (idle_hours / 8.0).clamp(0.0, 1.0);

        let cpu_headroom = 1.0 - (usage.cpu_utilization_percent / 100.0).clamp(0.0, 1.0);
        let mem_headroom = 1.0 - (usage.memory_utilization_percent / 100.0).clamp(0.0, 1.0);
        let prediction_value = ((cpu_headroom + mem_headroom) / 2.0).clamp(0.0, 1.0);

        Ok(Prediction {
            confidence,
            prediction_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn usage(idle_hours: u64, cpu_pct: f64, mem_pct: f64) -> WorkloadUsage {
        WorkloadUsage {
            workload: "svc".to_string(),
            namespace: "default".to_string(),
            cpu_utilization_percent: cpu_pct,
            memory_utilization_percent: mem_pct,
            cpu_usage_cores: 0.1,
            memory_usage_bytes: 100 * 1024 * 1024,
            cpu_request_cores: 0.5,
            memory_request_bytes: 512 * 1024 * 1024,
            idle_duration: Duration::from_secs(idle_hours * 3600),
            replicas: 2,
            monthly_cost: 50.0,
        }
    }

    #[tokio::test]
    async fn test_long_idle_raises_confidence() {
        let provider = HeuristicProvider::new(vec![]);
        let short = provider.predict(&usage(1, 50.0, 50.0)).await.unwrap();
        let long = provider.predict(&usage(8, 50.0, 50.0)).await.unwrap();
        assert!(long.confidence > short.confidence);
        assert_eq!(long.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_headroom_drives_prediction_value() {
        let provider = HeuristicProvider::new(vec![]);
        let busy = provider.predict(&usage(2, 90.0, 90.0)).await.unwrap();
        let idle = provider.predict(&usage(2, 10.0, 10.0)).await.unwrap();
        assert!(idle.prediction_value > busy.prediction_value);
        assert!((idle.prediction_value - 0.9).abs() < 1e-9);
    }
}
