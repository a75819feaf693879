//! Read-only guard for generated SQL.
//!
//! Model output is parsed with [sqlparser](https://docs.rs/sqlparser/) using
//! the target backend's dialect. Only statements that cannot change data are
//! let through: queries, `SHOW ...`, `DESCRIBE` and `EXPLAIN` of a query.

use crate::error::{AppError, AppResult};
use crate::models::DatabaseType;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

const BLOCKED_REASON: &str =
    "Only read-only statements are executed. Re-run with --allow-writes to permit it.";
const PARSE_ERROR: &str = "Generated SQL could not be parsed.";

fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Check that every statement in `sql` is read-only.
///
/// Returns `AppError::Permission` naming the first offending statement, or
/// `AppError::InvalidInput` when the text does not parse.
pub fn validate_readonly(sql: &str, db_type: DatabaseType) -> AppResult<()> {
    let dialect = dialect_for(db_type);
    let statements = Parser::parse_sql(dialect.as_ref(), sql)
        .map_err(|e| AppError::invalid_input(format!("{} Error: {}", PARSE_ERROR, e)))?;

    if statements.is_empty() {
        return Err(AppError::invalid_input("Empty SQL statement"));
    }

    for statement in &statements {
        if !is_read_only(statement) {
            return Err(AppError::permission(operation_name(statement), BLOCKED_REASON));
        }
    }
    Ok(())
}

fn is_read_only(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => query_is_read_only(query),
        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ExplainTable { .. } => true,
        // EXPLAIN ANALYZE runs the statement, so the inner one decides
        Statement::Explain { statement, .. } => is_read_only(statement),
        _ => false,
    }
}

/// A query can still write: `SELECT ... INTO` creates a table and
/// PostgreSQL allows `INSERT`/`UPDATE`/`DELETE ... RETURNING` inside `WITH`.
fn query_is_read_only(query: &Query) -> bool {
    let ctes_read_only = query.with.as_ref().is_none_or(|with| {
        with.cte_tables
            .iter()
            .all(|cte| query_is_read_only(&cte.query))
    });
    ctes_read_only && set_expr_is_read_only(&query.body)
}

fn set_expr_is_read_only(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => query_is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_is_read_only(left) && set_expr_is_read_only(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

/// Leading keywords of the statement, e.g. `INSERT` or `DROP TABLE`.
fn operation_name(statement: &Statement) -> String {
    let rendered = statement.to_string();
    let words: Vec<&str> = rendered.split_whitespace().take(2).collect();
    match words.as_slice() {
        [first, second]
            if matches!(
                first.to_uppercase().as_str(),
                "CREATE" | "DROP" | "ALTER" | "SHOW"
            ) =>
        {
            format!("{} {}", first.to_uppercase(), second.to_uppercase())
        }
        [first, ..] => first.to_uppercase(),
        [] => "UNKNOWN".to_string(),
    }
}
