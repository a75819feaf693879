//! Schema and sample extraction from MySQL-style SQL dumps.
//!
//! Used when no database is reachable (offline mode) and by the
//! `inspect-dump` command. Only `CREATE TABLE` and `INSERT INTO` statements
//! are read; everything else in the file is ignored.

use crate::error::{AppError, AppResult};
use crate::models::{ColumnDefinition, DatabaseSchema, ForeignKey, IndexInfo, Row, TableSchema};
use flate2::read::GzDecoder;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static CREATE_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)CREATE\s+(?:TEMPORARY\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:[`"]?\w+[`"]?\.)?[`"']?(\w+)[`"']?\s*\("#,
    )
    .expect("valid regex")
});

static CONSTRAINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:PRIMARY|FOREIGN|UNIQUE|KEY|INDEX|CONSTRAINT|CHECK|FULLTEXT|SPATIAL)\b")
        .expect("valid regex")
});

static COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)^[`"]?(\w+)[`"]?\s+(.*)$"#).expect("valid regex"));

static TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+(?:\s*\([^)]*\))?").expect("valid regex"));

static DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bDEFAULT\s+('(?:[^'\\]|\\.)*'|[^,\s]+)").expect("valid regex")
});

static PRIMARY_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)PRIMARY\s+KEY\s*(?:USING\s+\w+\s*)?\(([^)]+(?:\([^)]*\)[^)]*)*)\)")
        .expect("valid regex")
});

static FOREIGN_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:CONSTRAINT\s+[`"]?(\w+)[`"]?\s+)?FOREIGN\s+KEY\s*(?:[`"]?\w+[`"]?\s*)?\(([^)]+)\)\s*REFERENCES\s+(?:[`"]?\w+[`"]?\.)?[`"]?(\w+)[`"]?\s*\(([^)]+)\)"#,
    )
    .expect("valid regex")
});

static INDEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^(?:CONSTRAINT\s+[`"]?\w+[`"]?\s+)?(UNIQUE|FULLTEXT|SPATIAL)?\s*(?:KEY|INDEX)?\s*(?:[`"]?(\w+)[`"]?\s*)?\((.+)\)"#,
    )
    .expect("valid regex")
});

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// Parsed view of a SQL dump file.
#[derive(Debug, Clone)]
pub struct DumpParser {
    path: PathBuf,
    content: String,
    tables: Vec<TableSchema>,
}

impl DumpParser {
    /// Read and parse a dump file, gunzipping it first when it starts with
    /// the gzip magic bytes.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let shown = path.display().to_string();
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AppError::dump("SQL file not found", &shown),
            _ => AppError::dump(format!("Failed to read SQL file: {e}"), &shown),
        })?;

        let bytes = if bytes.starts_with(&GZIP_MAGIC) {
            gunzip(&bytes).map_err(|e| {
                AppError::dump(format!("Failed to decompress gzip dump: {e}"), &shown)
            })?
        } else {
            bytes
        };

        let content = String::from_utf8_lossy(&bytes).into_owned();
        let parser = Self::from_sql(content).with_path(path);
        info!(path = %shown, tables = parser.tables.len(), "Parsed SQL dump");
        Ok(parser)
    }

    /// Parse dump text held in memory.
    pub fn from_sql(content: impl Into<String>) -> Self {
        let content = content.into();
        let tables = extract_table_definitions(&content)
            .into_iter()
            .map(|(name, body)| parse_table(&name, &body))
            .collect();
        Self {
            path: PathBuf::new(),
            content,
            tables,
        }
    }

    fn with_path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Table names in file order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.table_name.clone()).collect()
    }

    pub fn table_schema(&self, table: &str) -> AppResult<TableSchema> {
        self.tables
            .iter()
            .find(|t| t.table_name == table)
            .cloned()
            .ok_or_else(|| {
                AppError::schema(format!("Table '{}' not found in SQL file", table), table)
            })
    }

    pub fn full_schema(&self) -> DatabaseSchema {
        self.tables
            .iter()
            .map(|t| (t.table_name.clone(), t.clone()))
            .collect()
    }

    /// Up to `limit` rows from the table's `INSERT` statements.
    ///
    /// NULL values are left out of the row maps.
    pub fn sample_rows(&self, table: &str, limit: usize) -> Vec<Row> {
        let Some(schema) = self.tables.iter().find(|t| t.table_name == table) else {
            return Vec::new();
        };
        if limit == 0 || schema.columns.is_empty() {
            return Vec::new();
        }

        let pattern = format!(
            r#"(?i)INSERT\s+(?:IGNORE\s+)?INTO\s+(?:[`"]?\w+[`"]?\.)?[`"]?{}[`"]?\s*(?:\(([^)]*)\)\s*)?VALUES?\s*"#,
            regex::escape(table)
        );
        let Ok(insert_re) = Regex::new(&pattern) else {
            return Vec::new();
        };

        let mut rows = Vec::new();
        for caps in insert_re.captures_iter(&self.content) {
            let columns: Vec<String> = match caps.get(1) {
                Some(list) => split_column_list(list.as_str()),
                None => schema.columns.iter().map(|c| c.name.clone()).collect(),
            };
            let Some(values_start) = caps.get(0).map(|m| m.end()) else {
                continue;
            };

            for tuple in scan_tuples(&self.content[values_start..]) {
                let mut row = Row::new();
                for (name, raw) in columns.iter().zip(parse_values(&tuple)) {
                    let value = clean_value(&raw);
                    if !value.is_null() {
                        row.insert(name.clone(), value);
                    }
                }
                if !row.is_empty() {
                    rows.push(row);
                }
                if rows.len() >= limit {
                    return rows;
                }
            }
        }

        if rows.is_empty() {
            debug!(table = %table, "No sample data found in SQL file");
        }
        rows
    }

    /// Schemas plus sample rows for every table, as JSON.
    pub fn export(&self, sample_limit: usize) -> JsonValue {
        let tables: serde_json::Map<String, JsonValue> = self
            .tables
            .iter()
            .map(|t| {
                let samples = self.sample_rows(&t.table_name, sample_limit);
                (
                    t.table_name.clone(),
                    serde_json::json!({ "schema": t, "sample_data": samples }),
                )
            })
            .collect();
        serde_json::json!({
            "source": self.path.display().to_string(),
            "tables": tables,
        })
    }
}

/// Newest `.sql` (or `.sql.gz`) file directly under `dir`.
pub fn latest_dump(dir: impl AsRef<Path>) -> AppResult<PathBuf> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AppError::dump(
            format!("Cannot read dump directory: {e}"),
            dir.display().to_string(),
        )
    })?;

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            name.ends_with(".sql") || name.ends_with(".sql.gz")
        })
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
        .ok_or_else(|| {
            AppError::dump(
                "No SQL dump found; pass --sql-file",
                dir.display().to_string(),
            )
        })
}

/// `(table name, column section)` for each `CREATE TABLE`, in file order.
/// A later definition of the same table replaces the earlier one.
fn extract_table_definitions(content: &str) -> Vec<(String, String)> {
    let mut definitions: Vec<(String, String)> = Vec::new();
    for caps in CREATE_TABLE_RE.captures_iter(content) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(body) = balanced_body(&content[whole.end()..]) else {
            warn!(table = name.as_str(), "Unterminated CREATE TABLE statement");
            continue;
        };
        let name = name.as_str().to_string();
        match definitions.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = body.to_string(),
            None => definitions.push((name, body.to_string())),
        }
    }
    definitions
}

/// Text up to the parenthesis closing an already-opened one.
fn balanced_body(text: &str) -> Option<&str> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escape = false;
    for (idx, ch) in text.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match (quote, ch) {
            (Some(_), '\\') => escape = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas outside parentheses and quotes.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut level = 0i32;
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(ch);
            }
            (Some(_), _) => current.push(ch),
            (None, '\'' | '"' | '`') => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, '(' | '{' | '[') => {
                level += 1;
                current.push(ch);
            }
            (None, ')' | '}' | ']') => {
                level -= 1;
                current.push(ch);
            }
            (None, ',') if level == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Column names from a `(a, `b`, c(10))` style list.
fn split_column_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| {
            let c = c.trim().trim_matches(|ch| ch == '`' || ch == '"' || ch == '\'');
            // Drop index prefix lengths and sort order: `name`(10) DESC
            c.split(|ch: char| ch == '(' || ch.is_whitespace() || ch == '`' || ch == '"')
                .next()
                .unwrap_or(c)
                .to_string()
        })
        .filter(|c| !c.is_empty())
        .collect()
}

fn parse_table(name: &str, body: &str) -> TableSchema {
    let mut schema = TableSchema::new(name);
    let mut table_primary_key: Vec<String> = Vec::new();

    for part in split_top_level(body) {
        if part.is_empty() {
            continue;
        }

        if CONSTRAINT_RE.is_match(&part) {
            if let Some(caps) = PRIMARY_KEY_RE.captures(&part) {
                if table_primary_key.is_empty() {
                    table_primary_key = split_column_list(&caps[1]);
                }
            } else if let Some(caps) = FOREIGN_KEY_RE.captures(&part) {
                let references_table = caps[3].to_string();
                let fk_name = caps
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| format!("fk_{}_{}", name, references_table));
                schema.foreign_keys.push(
                    ForeignKey::new(
                        split_column_list(&caps[2]),
                        references_table,
                        split_column_list(&caps[4]),
                    )
                    .with_name(fk_name),
                );
            } else if let Some(index) = parse_index(&part) {
                schema.indexes.push(index);
            }
            continue;
        }

        let Some(caps) = COLUMN_RE.captures(&part) else {
            continue;
        };
        let column_name = caps[1].to_string();
        let definition = caps[2].trim();
        let upper = definition.to_uppercase();

        let data_type = TYPE_RE
            .find(definition)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let mut column = ColumnDefinition::new(column_name, data_type, !upper.contains("NOT NULL"))
            .with_primary_key(upper.contains("PRIMARY KEY"));
        if let Some(default) = DEFAULT_RE.captures(definition) {
            column = column.with_default(&default[1]);
        }
        schema.columns.push(column);
    }

    schema.primary_key = table_primary_key;
    schema.derive_primary_key();
    schema
}

fn parse_index(part: &str) -> Option<IndexInfo> {
    let caps = INDEX_RE.captures(part)?;
    let columns = split_column_list(caps.get(3)?.as_str());
    let first = columns.first()?.clone();
    let kind = caps.get(1).map(|m| m.as_str().to_uppercase());
    let name = caps
        .get(2)
        .map(|m| m.as_str().to_string())
        .unwrap_or(first);
    Some(IndexInfo::new(name, columns).with_unique(kind.as_deref() == Some("UNIQUE")))
}

/// Contents of each top-level `( ... )` tuple up to the terminating `;`.
fn scan_tuples(text: &str) -> Vec<String> {
    let mut tuples = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escape = false;

    for ch in text.chars() {
        if escape {
            escape = false;
            if depth > 0 {
                current.push(ch);
            }
            continue;
        }
        match (quote, ch) {
            (Some(_), '\\') => {
                escape = true;
                current.push(ch);
            }
            (Some(q), c) if c == q => {
                quote = None;
                current.push(ch);
            }
            (Some(_), _) => current.push(ch),
            (None, '\'' | '"') if depth > 0 => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, '(') => {
                if depth > 0 {
                    current.push(ch);
                }
                depth += 1;
            }
            (None, ')') if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    tuples.push(std::mem::take(&mut current));
                } else {
                    current.push(ch);
                }
            }
            (None, ';') if depth == 0 => break,
            _ => {
                if depth > 0 {
                    current.push(ch);
                }
            }
        }
    }
    tuples
}

/// Split a tuple's contents into raw value tokens, honouring quotes,
/// backslash escapes and nested parentheses.
fn parse_values(values: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escape = false;
    let mut level = 0i32;

    for ch in values.chars() {
        if escape {
            current.push(ch);
            escape = false;
            continue;
        }
        match (quote, ch) {
            (_, '\\') => {
                current.push(ch);
                escape = true;
            }
            (None, '\'' | '"') => {
                quote = Some(ch);
                current.push(ch);
            }
            (Some(q), c) if c == q => {
                quote = None;
                current.push(ch);
            }
            (None, '(') => {
                level += 1;
                current.push(ch);
            }
            (None, ')') => {
                level -= 1;
                current.push(ch);
            }
            (None, ',') if level == 0 => {
                result.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        result.push(current.trim().to_string());
    }
    result
}

/// Turn a raw SQL literal into a JSON value.
///
/// `NULL` and empty tokens become null. Quoted strings are unquoted and
/// unescaped, lose HTML tags, and have escaped line breaks, tabs and
/// whitespace runs collapsed to single spaces. Other tokens become numbers
/// when they parse as one.
fn clean_value(raw: &str) -> JsonValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NULL") {
        return JsonValue::Null;
    }

    let quoted = trimmed.len() >= 2
        && ((trimmed.starts_with('\'') && trimmed.ends_with('\''))
            || (trimmed.starts_with('"') && trimmed.ends_with('"')));
    if quoted {
        let inner = trimmed[1..trimmed.len() - 1]
            .replace("\\'", "'")
            .replace("\\\"", "\"");
        return JsonValue::String(normalize_text(&inner));
    }

    let number = if trimmed.contains('.') {
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
    } else {
        trimmed.parse::<i64>().ok().map(serde_json::Number::from)
    };
    match number {
        Some(n) => JsonValue::Number(n),
        None => JsonValue::String(normalize_text(trimmed)),
    }
}

fn normalize_text(text: &str) -> String {
    let stripped = HTML_TAG_RE.replace_all(text, " ");
    stripped
        .replace("\\r", " ")
        .replace("\\n", " ")
        .replace("\\t", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
