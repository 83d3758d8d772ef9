//! Metrics reporting CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, EngineMetrics, ExecutorMetrics, SafetyMetrics};
use crate::output::{format_currency, format_percent, OutputFormat};

/// Row for the per-executor metrics table
#[derive(Tabled)]
struct ExecutorRow {
    #[tabled(rename = "Executor")]
    executor: String,
    #[tabled(rename = "Total")]
    total: usize,
    #[tabled(rename = "Succeeded")]
    succeeded: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Rollbacks")]
    rollbacks: usize,
    #[tabled(rename = "Avg Time")]
    avg_time: String,
    #[tabled(rename = "Active")]
    active: usize,
}

impl ExecutorRow {
    fn new(name: &str, m: &ExecutorMetrics) -> Self {
        Self {
            executor: name.to_string(),
            total: m.total_operations,
            succeeded: m.successful_operations,
            failed: m.failed_operations,
            rollbacks: m.rollback_count,
            avg_time: format!("{:.1}s", m.average_execution_secs),
            active: m.active_operations,
        }
    }
}

/// Show engine-level optimization metrics
pub async fn show_optimization(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: EngineMetrics = client.get("api/v1/metrics/optimization").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Table => {
            println!("{}", "Optimization Engine".bold());
            println!("{}", "=".repeat(50));
            println!("Plans created:          {}", result.total_plans);
            println!("Executions:             {}", result.total_executions);
            println!("Successful actions:     {}", result.successful_actions);
            println!("Failed actions:         {}", result.failed_actions);
            println!("Rollbacks:              {}", result.rollback_count);
            println!(
                "Success rate:           {}",
                format_percent(
                    result.successful_actions as f64,
                    (result.successful_actions + result.failed_actions) as f64
                )
            );
            println!(
                "{}  {}",
                "Actual savings:".bold(),
                format_currency(result.total_actual_savings).green().bold()
            );
        }
    }

    Ok(())
}

/// Show per-executor metrics side by side
pub async fn show_executors(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let scaling: ExecutorMetrics = client.get("api/v1/metrics/scaling").await?;
    let rightsizing: ExecutorMetrics = client.get("api/v1/metrics/rightsizing").await?;
    let cost: ExecutorMetrics = client.get("api/v1/metrics/cost").await?;

    match format {
        OutputFormat::Json => {
            let combined = serde_json::json!({
                "scaling": scaling,
                "rightsizing": rightsizing,
                "cost": cost,
            });
            println!("{}", serde_json::to_string_pretty(&combined)?);
        }
        OutputFormat::Table => {
            let rows = vec![
                ExecutorRow::new("zero-pod scaler", &scaling),
                ExecutorRow::new("rightsizer", &rightsizing),
                ExecutorRow::new("cost optimizer", &cost),
            ];
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Show safety manager metrics
pub async fn show_safety(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: SafetyMetrics = client.get("api/v1/metrics/safety").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Table => {
            println!("{}", "Safety Manager".bold());
            println!("{}", "=".repeat(50));
            println!("Checks run:             {}", result.total_checks);
            println!("Checks passed:          {}", result.passed_checks);
            println!(
                "Checks failed:          {}",
                if result.failed_checks > 0 {
                    result.failed_checks.to_string().red().to_string()
                } else {
                    result.failed_checks.to_string()
                }
            );
            println!("Rollbacks attempted:    {}", result.rollbacks_attempted);
            println!("Rollbacks succeeded:    {}", result.rollbacks_succeeded);
            println!(
                "Avg check duration:     {:.1}ms",
                result.average_check_duration_ms
            );
        }
    }

    Ok(())
}
