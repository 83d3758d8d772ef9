//! Core library for the workload optimizer
//!
//! This crate provides the optimization action lifecycle:
//! - Cluster analysis and action proposal (optimization engine)
//! - Pre-flight safety gating and rollback execution (safety manager)
//! - Strategy executors for zero-pod scaling, resource rightsizing, and
//!   cost optimization, sharing one execute-with-safety-and-rollback
//!   protocol
//! - The Kubernetes read/write boundary and the analytics boundary
//! - Health checks and observability

pub mod analytics;
pub mod cluster;
pub mod cost;
pub mod engine;
pub mod error;
pub mod exec;
pub mod health;
pub mod models;
pub mod observability;
pub mod safety;

pub use error::{OptimizerError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{OptimizerMetrics, StructuredLogger};
