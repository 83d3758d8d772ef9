//! Service status command

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, HealthResponse};
use crate::output::{color_status, OutputFormat};

/// Show optimizer service health
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("healthz").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        OutputFormat::Table => {
            println!("{}", "Optimizer Status".bold());
            println!("{}", "=".repeat(50));
            println!("Overall:                {}", color_status(&health.status));

            if let Some(components) = health.components.as_object() {
                for (name, detail) in components {
                    let status = detail
                        .get("status")
                        .and_then(|s| s.as_str())
                        .unwrap_or("unknown");
                    println!("{:<23} {}", format!("{}:", name), color_status(status));
                }
            }
        }
    }

    Ok(())
}
