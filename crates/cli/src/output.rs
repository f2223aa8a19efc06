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

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format a CPU percentage
pub fn format_percent(percent: f64) -> String {
    format!("{:.1}%", percent)
}

/// Color a CPU average against the usual scale thresholds
pub fn color_utilization(percent: f64) -> String {
    let formatted = format_percent(percent);
    if percent >= 70.0 {
        formatted.red().to_string()
    } else if percent <= 30.0 {
        formatted.blue().to_string()
    } else {
        formatted.green().to_string()
    }
}
