//! Terminal output helpers

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};

pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Errors go to stderr so `--json` output stays parseable
pub fn error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg);
}

pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Indented `label: value` line used in summaries
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {} {}", format!("{}:", label).dimmed(), value);
}

/// Table with the house style
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}
