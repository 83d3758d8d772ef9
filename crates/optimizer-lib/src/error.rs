//! Error taxonomy for the optimization action lifecycle
//!
//! Each variant maps to one failure class: validation and gating failures
//! occur before any mutation, mutation failures leave the cluster untouched,
//! verification failures trigger mandatory rollback, and rollback failures
//! are terminal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Malformed action, rejected before any cluster contact
    #[error("validation failed: {0}")]
    Validation(String),

    /// A critical safety check failed; no mutation was attempted
    #[error("safety gate failed: critical check '{check}' did not pass: {detail}")]
    Gating { check: String, detail: String },

    /// A cluster read or write failed
    #[error("cluster operation failed: {0}")]
    Cluster(String),

    /// The mutating call failed; nothing changed, rollback not needed
    #[error("mutation failed: {0}")]
    Mutation(String),

    /// Mutation applied but post-state or health did not match expectations
    #[error("verification failed: {0}")]
    Verification(String),

    /// Restoring original state failed; terminal, never auto-retried
    #[error("rollback failed: {0}")]
    Rollback(String),
}

impl OptimizerError {
    /// Whether the failure happened after a mutation was applied
    pub fn mutation_applied(&self) -> bool {
        matches!(
            self,
            OptimizerError::Verification(_) | OptimizerError::Rollback(_)
        )
    }
}

impl From<kube::Error> for OptimizerError {
    fn from(e: kube::Error) -> Self {
        OptimizerError::Cluster(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OptimizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gating_error_names_check() {
        let err = OptimizerError::Gating {
            check: "cluster_health".to_string(),
            detail: "cpu at 95%".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cluster_health"));
        assert!(msg.contains("cpu at 95%"));
    }

    #[test]
    fn test_mutation_applied_classification() {
        assert!(!OptimizerError::Validation("x".into()).mutation_applied());
        assert!(!OptimizerError::Mutation("x".into()).mutation_applied());
        assert!(OptimizerError::Verification("x".into()).mutation_applied());
        assert!(OptimizerError::Rollback("x".into()).mutation_applied());
    }
}
