use crate::model::{CategoryOutcome, RunResult};
use serde::Serialize;
use std::path::Path;

pub trait OutputFormatter {
    fn format_text(&self) -> String;
    fn format_json(&self, pretty: bool) -> crate::Result<String>;
}

pub fn print_output<T: OutputFormatter>(
    data: &T,
    as_json: bool,
    json_pretty: bool,
) -> crate::Result<()> {
    let output = if as_json {
        data.format_json(json_pretty)?
    } else {
        data.format_text()
    };

    println!("{}", output);
    Ok(())
}

pub fn to_json<T: Serialize>(data: &T, pretty: bool) -> crate::Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(data)?)
    } else {
        Ok(serde_json::to_string(data)?)
    }
}

/// Writes the run result handed to the export step: records in run order
/// plus the per-category reports.
pub fn write_result(path: &Path, result: &RunResult, pretty: bool) -> crate::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_json(result, pretty)?)?;
    tracing::info!("wrote {} records to {}", result.records.len(), path.display());
    Ok(())
}

pub mod text {
    use crate::model::CategoryOutcome;
    use colored::Colorize;

    pub fn success(msg: &str) -> String {
        format!("{} {}", "✓".green().bold(), msg)
    }

    pub fn warning(msg: &str) -> String {
        format!("{} {}", "⚠".yellow().bold(), msg)
    }

    pub fn bullet(msg: &str) -> String {
        format!("  • {}", msg)
    }

    pub fn section(title: &str) -> String {
        format!("\n{}\n{}", title.bold(), "─".repeat(title.len()))
    }

    pub fn key_value(key: &str, value: &str) -> String {
        format!("  {}: {}", key.bold(), value)
    }

    pub fn outcome(outcome: &CategoryOutcome) -> String {
        match outcome {
            CategoryOutcome::Completed => "completed".green().to_string(),
            CategoryOutcome::PartiallyCompleted { pages_done } => {
                format!("partial ({} pages)", pages_done).yellow().to_string()
            }
            CategoryOutcome::Failed { .. } => "failed".red().to_string(),
        }
    }

    pub fn table_header(columns: &[&str]) -> String {
        let header = columns
            .iter()
            .map(|c| format!("{:20}", c.bold()))
            .collect::<Vec<_>>()
            .join(" ");
        let divider = "─".repeat(columns.len() * 21);
        format!("{}\n{}", header, divider)
    }

    pub fn table_row(values: &[String]) -> String {
        values
            .iter()
            .map(|v| format!("{:20}", v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", kept)
        }
    }

    pub fn format_duration_ms(ms: u64) -> String {
        if ms >= 60_000 {
            format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
        } else if ms >= 1000 {
            format!("{:.2}s", ms as f64 / 1000.0)
        } else {
            format!("{}ms", ms)
        }
    }
}

pub struct TableBuilder {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn headers(mut self, headers: Vec<String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn row(mut self, row: Vec<String>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn build(self) -> String {
        let mut output = String::new();

        if !self.headers.is_empty() {
            output.push_str(&text::table_header(
                &self.headers.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            ));
            output.push('\n');
        }

        for row in self.rows {
            output.push_str(&text::table_row(&row));
            output.push('\n');
        }

        output
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One row per category: outcome, pages, records, skipped, duplicates.
pub fn category_table(result: &RunResult) -> String {
    result
        .categories
        .iter()
        .fold(
            TableBuilder::new().headers(
                ["Category", "Outcome", "Pages", "Records", "Skipped/Dups"]
                    .map(String::from)
                    .to_vec(),
            ),
            |table, (name, report)| {
                let outcome = match &report.outcome {
                    CategoryOutcome::Failed { reason } => {
                        format!("{}: {}", text::outcome(&report.outcome), reason)
                    }
                    other => text::outcome(other),
                };
                table.row(vec![
                    text::truncate(name, 20),
                    outcome,
                    report.pages_traversed().to_string(),
                    report.records.to_string(),
                    format!("{}/{}", report.skipped_listings, report.duplicates_dropped),
                ])
            },
        )
        .build()
}
