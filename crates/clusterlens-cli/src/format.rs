//! Output formatting utilities for lensctl
//!
//! Supports multiple output formats:
//! - Table: ASCII tables with borders (default)
//! - JSON: Machine-readable JSON
//! - YAML: Human-readable YAML
//! - Text: Plain text, one item per line

use anyhow::Result;
use colored::*;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use crate::config::OutputFormat;

/// Format and print output based on configured format
pub struct Formatter {
    format: OutputFormat,
    colored: bool,
}

impl Formatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    pub fn colored(&self) -> bool {
        self.colored
    }

    /// Whether output is meant for people rather than other programs
    pub fn is_human(&self) -> bool {
        matches!(self.format, OutputFormat::Table | OutputFormat::Text)
    }

    /// Print a list of rows
    pub fn print_list<T: Serialize + Tabled>(&self, items: Vec<T>) -> Result<()> {
        match self.format {
            OutputFormat::Table => self.print_table(items),
            OutputFormat::Json => self.print_json(&items),
            OutputFormat::Yaml => self.print_yaml(&items),
            OutputFormat::Text => self.print_text(items),
        }
    }

    /// Print a full document. Table and text formats fall back to JSON.
    pub fn print_document<T: Serialize>(&self, item: &T) -> Result<()> {
        match self.format {
            OutputFormat::Yaml => self.print_yaml(item),
            _ => self.print_json(item),
        }
    }

    /// Print a section heading (table and text formats only)
    pub fn print_heading(&self, heading: &str) {
        if !self.is_human() {
            return;
        }
        if self.colored {
            println!("{}", heading.bold());
        } else {
            println!("{}", heading);
        }
    }

    /// Print an info message
    pub fn print_info(&self, message: &str) {
        if self.colored {
            eprintln!("{} {}", "ℹ️".blue(), message);
        } else {
            eprintln!("ℹ️  {}", message);
        }
    }

    /// Print a warning message
    pub fn print_warning(&self, message: &str) {
        if self.colored {
            eprintln!("{} {}", "⚠️".yellow(), message);
        } else {
            eprintln!("⚠️  {}", message);
        }
    }

    fn print_table<T: Tabled>(&self, items: Vec<T>) -> Result<()> {
        if items.is_empty() {
            println!("No items found");
            return Ok(());
        }

        let mut table = Table::new(items);
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));

        println!("{}", table);
        Ok(())
    }

    fn print_json<T: Serialize + ?Sized>(&self, items: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(items)?;
        println!("{}", json);
        Ok(())
    }

    fn print_yaml<T: Serialize + ?Sized>(&self, items: &T) -> Result<()> {
        let yaml = serde_yaml::to_string(items)?;
        println!("{}", yaml);
        Ok(())
    }

    /// One line per row, cells separated by tabs
    fn print_text<T: Tabled>(&self, items: Vec<T>) -> Result<()> {
        if items.is_empty() {
            println!("No items found");
            return Ok(());
        }

        for item in items {
            let cells: Vec<String> = item.fields().into_iter().map(|c| c.into_owned()).collect();
            println!("{}", cells.join("\t"));
        }
        Ok(())
    }
}

/// Display key-value pairs
pub fn print_key_value(pairs: Vec<(String, String)>, colored: bool) {
    for (key, value) in pairs {
        if colored {
            println!("  {}: {}", key.bold(), value);
        } else {
            println!("  {}: {}", key, value);
        }
    }
}

/// `-` for missing values
pub fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Milliseconds since epoch as UTC wall-clock time
pub fn timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

pub fn rate(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "-".to_string())
}
