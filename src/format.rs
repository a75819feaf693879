//! Result rendering for the terminal.

use crate::models::{QueryResult, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pipe-separated lines
    #[default]
    Plain,
    /// ASCII table (like the MySQL CLI)
    Table,
    /// Markdown table
    Markdown,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputFormat::Plain => "plain",
            OutputFormat::Table => "table",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
        };
        f.write_str(name)
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell(row: &Row, column: &str) -> String {
    row.get(column).map(format_value).unwrap_or_default()
}

/// Render `result` in the requested format.
pub fn render(result: &QueryResult, format: OutputFormat) -> String {
    let mut output = match format {
        OutputFormat::Plain => format_results(&result.rows, &result.columns),
        OutputFormat::Table => format_as_table(
            &result.columns,
            &result.rows,
            result.row_count(),
            result.execution_time_ms,
        ),
        OutputFormat::Markdown => {
            format_as_markdown(&result.columns, &result.rows, result.row_count())
        }
        OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
    };
    if result.truncated && format != OutputFormat::Json {
        output.push_str(&format!(
            "\n(results truncated to {} rows)",
            result.row_count()
        ));
    }
    output
}

/// Header, dash separator and one ` | `-joined line per row.
pub fn format_results(rows: &[Row], columns: &[String]) -> String {
    if rows.is_empty() {
        return "No results found.".to_string();
    }

    let header = columns.join(" | ");
    let separator = "-".repeat(header.chars().count());
    let mut lines = vec![header, separator];
    for row in rows {
        let values: Vec<String> = columns.iter().map(|c| cell(row, c)).collect();
        lines.push(values.join(" | "));
    }
    lines.join("\n")
}

fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right_align {
        format!("{fill}{text}")
    } else {
        format!("{text}{fill}")
    }
}

pub fn format_as_table(
    columns: &[String],
    rows: &[Row],
    row_count: usize,
    execution_time_ms: u64,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, column) in columns.iter().enumerate() {
            widths[i] = widths[i].max(cell(row, column).width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = separator.clone();
    for (column, w) in columns.iter().zip(&widths) {
        let left = (w - column.width()) / 2;
        let right = w - column.width() - left;
        output.push_str(&format!("| {}{}{} ", " ".repeat(left), column, " ".repeat(right)));
    }
    output.push_str("|\n");
    output.push_str(&separator);

    for row in rows {
        for (column, w) in columns.iter().zip(&widths) {
            let numeric = matches!(row.get(column), Some(JsonValue::Number(_)));
            output.push_str(&format!("| {} ", pad(&cell(row, column), *w, numeric)));
        }
        output.push_str("|\n");
    }
    output.push_str(&separator);

    let noun = if row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        row_count,
        noun,
        execution_time_ms as f64 / 1000.0
    ));
    output
}

pub fn format_as_markdown(columns: &[String], rows: &[Row], row_count: usize) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let escape = |s: String| s.replace('|', "\\|").replace('\n', " ");
    let mut output: String = columns.iter().map(|c| format!("| {} ", c)).collect();
    output.push_str("|\n");
    output.push_str(&columns.iter().map(|_| "|---").collect::<String>());
    output.push_str("|\n");

    for row in rows {
        let line: String = columns
            .iter()
            .map(|c| format!("| {} ", escape(cell(row, c))))
            .collect();
        output.push_str(&line);
        output.push_str("|\n");
    }

    output.push_str(&format!("\n*{} rows*", row_count));
    output
}
