//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print an error message
#[allow(dead_code)]
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Format currency in dollars
pub fn format_currency(amount: f64) -> String {
    format!("${:.2}", amount)
}

/// Format a ratio as percentage
pub fn format_percent(value: f64, total: f64) -> String {
    if total <= 0.0 {
        return "n/a".to_string();
    }
    format!("{:.1}%", value / total * 100.0)
}

/// Color a health status string
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "completed" => status.green().to_string(),
        "degraded" | "pending" | "executing" => status.yellow().to_string(),
        "unhealthy" | "failed" | "rolled_back" => status.red().to_string(),
        _ => status.to_string(),
    }
}
