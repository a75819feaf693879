//! Row decoding into JSON.
//!
//! Result rows become `serde_json` maps so the formatter, the web front end
//! and the schema describer never touch driver types. Each column's declared
//! type is first mapped to a [`ValueKind`]; the backend's [`DecodeCell`]
//! implementation then tries the Rust types that kind can hold.

use crate::models::{DatabaseType, Row as JsonRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What a column holds, independent of the backend's spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Temporal,
    Unknown,
}

impl ValueKind {
    pub fn of(type_name: &str, db: DatabaseType) -> Self {
        let ty = type_name.to_lowercase();

        if ty.contains("decimal") || ty.contains("numeric") {
            // NUMERIC affinity in SQLite is stored as REAL or INTEGER
            return if db == DatabaseType::SQLite {
                ValueKind::Float
            } else {
                ValueKind::Decimal
            };
        }
        if ty.contains("int") || ty.contains("serial") {
            return ValueKind::Integer;
        }
        match ty.as_str() {
            "bool" | "boolean" => return ValueKind::Boolean,
            "real" | "float4" | "float8" => return ValueKind::Float,
            "json" | "jsonb" => return ValueKind::Json,
            "bytea" => return ValueKind::Binary,
            _ => {}
        }
        if ty.contains("float") || ty.contains("double") {
            return ValueKind::Float;
        }
        if ty.contains("blob") || ty.contains("binary") {
            return ValueKind::Binary;
        }
        // SQLite has no temporal storage class; its dates are text
        if db != DatabaseType::SQLite
            && (ty == "date" || ty == "datetime" || ty.starts_with("time"))
        {
            return ValueKind::Temporal;
        }
        if ty.contains("char") || ty.contains("text") || ty == "enum" || ty == "name" {
            return ValueKind::Text;
        }
        ValueKind::Unknown
    }
}

/// DECIMAL/NUMERIC read as its exact textual form.
#[derive(Debug)]
pub struct DecimalText(pub String);

impl Type<sqlx::MySql> for DecimalText {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for DecimalText {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        <&str as Decode<sqlx::MySql>>::decode(value).map(|s| DecimalText(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for DecimalText {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        ty.name().eq_ignore_ascii_case("numeric")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for DecimalText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        <&str as Decode<sqlx::Postgres>>::decode(value).map(|s| DecimalText(s.to_string()))
    }
}

/// Binary data as JSON: UTF-8 text when valid, base64 otherwise.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Text cell; parsed when the column is declared as JSON.
fn text_value(text: String, type_name: &str) -> JsonValue {
    if type_name.to_lowercase().contains("json") {
        if let Ok(json) = serde_json::from_str(&text) {
            return json;
        }
    }
    JsonValue::String(text)
}

/// Non-null value of column `idx` as `T`, or `None` when NULL or not a `T`.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

/// Backend-specific cell decoding.
pub trait DecodeCell: Row {
    const BACKEND: DatabaseType;

    fn cell(&self, idx: usize, kind: ValueKind, type_name: &str) -> JsonValue;
}

impl DecodeCell for MySqlRow {
    const BACKEND: DatabaseType = DatabaseType::MySQL;

    fn cell(&self, idx: usize, kind: ValueKind, type_name: &str) -> JsonValue {
        let value = match kind {
            ValueKind::Decimal => get::<_, DecimalText>(self, idx).map(|d| JsonValue::String(d.0)),
            ValueKind::Integer => get::<_, i64>(self, idx)
                .map(JsonValue::from)
                .or_else(|| get::<_, u64>(self, idx).map(JsonValue::from)),
            ValueKind::Boolean => get::<_, bool>(self, idx).map(JsonValue::Bool),
            ValueKind::Float => get::<_, f64>(self, idx)
                .or_else(|| get::<_, f32>(self, idx).map(f64::from))
                .map(float_value),
            ValueKind::Binary => get::<_, Vec<u8>>(self, idx).map(|b| decode_binary_value(&b)),
            ValueKind::Json => get::<_, JsonValue>(self, idx),
            ValueKind::Temporal => get::<_, NaiveDateTime>(self, idx)
                .map(|v| v.format(DATETIME_FORMAT).to_string())
                .or_else(|| {
                    get::<_, DateTime<Utc>>(self, idx).map(|v| v.format(DATETIME_FORMAT).to_string())
                })
                .or_else(|| get::<_, NaiveDate>(self, idx).map(|v| v.to_string()))
                .or_else(|| get::<_, NaiveTime>(self, idx).map(|v| v.to_string()))
                .map(JsonValue::String),
            ValueKind::Text | ValueKind::Unknown => get::<_, String>(self, idx)
                .map(|s| text_value(s, type_name))
                // VARBINARY-backed text
                .or_else(|| get::<_, Vec<u8>>(self, idx).map(|b| decode_binary_value(&b))),
        };
        value.unwrap_or(JsonValue::Null)
    }
}

impl DecodeCell for PgRow {
    const BACKEND: DatabaseType = DatabaseType::PostgreSQL;

    fn cell(&self, idx: usize, kind: ValueKind, type_name: &str) -> JsonValue {
        let value = match kind {
            ValueKind::Decimal => get::<_, DecimalText>(self, idx).map(|d| JsonValue::String(d.0)),
            ValueKind::Integer => get::<_, i64>(self, idx)
                .or_else(|| get::<_, i32>(self, idx).map(i64::from))
                .or_else(|| get::<_, i16>(self, idx).map(i64::from))
                .map(JsonValue::from),
            ValueKind::Boolean => get::<_, bool>(self, idx).map(JsonValue::Bool),
            ValueKind::Float => get::<_, f64>(self, idx)
                .or_else(|| get::<_, f32>(self, idx).map(f64::from))
                .map(float_value),
            ValueKind::Binary => get::<_, Vec<u8>>(self, idx).map(|b| decode_binary_value(&b)),
            ValueKind::Json => get::<_, JsonValue>(self, idx),
            ValueKind::Temporal => get::<_, DateTime<Utc>>(self, idx)
                .map(|v| v.to_rfc3339())
                .or_else(|| {
                    get::<_, NaiveDateTime>(self, idx).map(|v| v.format(DATETIME_FORMAT).to_string())
                })
                .or_else(|| get::<_, NaiveDate>(self, idx).map(|v| v.to_string()))
                .or_else(|| get::<_, NaiveTime>(self, idx).map(|v| v.to_string()))
                .map(JsonValue::String),
            ValueKind::Text | ValueKind::Unknown => {
                get::<_, String>(self, idx).map(|s| text_value(s, type_name))
            }
        };
        value.unwrap_or(JsonValue::Null)
    }
}

impl DecodeCell for SqliteRow {
    const BACKEND: DatabaseType = DatabaseType::SQLite;

    fn cell(&self, idx: usize, kind: ValueKind, type_name: &str) -> JsonValue {
        let integer = || get::<_, i64>(self, idx).map(JsonValue::from);
        let real = || get::<_, f64>(self, idx).map(float_value);

        let value = match kind {
            ValueKind::Integer => integer(),
            ValueKind::Boolean => get::<_, bool>(self, idx).map(JsonValue::Bool),
            ValueKind::Float | ValueKind::Decimal => real().or_else(integer),
            ValueKind::Binary => get::<_, Vec<u8>>(self, idx).map(|b| decode_binary_value(&b)),
            // Expression columns carry no declared type; fall back on the
            // runtime storage class
            _ => get::<_, String>(self, idx)
                .map(|s| text_value(s, type_name))
                .or_else(integer)
                .or_else(real),
        };
        value.unwrap_or(JsonValue::Null)
    }
}

/// Conversion of driver rows into JSON maps.
pub trait RowToJson {
    fn column_names(&self) -> Vec<String>;

    fn to_json_map(&self) -> JsonRow;
}

impl<R: DecodeCell> RowToJson for R {
    fn column_names(&self) -> Vec<String> {
        self.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect()
    }

    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .map(|col| {
                let type_name = col.type_info().name();
                let kind = ValueKind::of(type_name, R::BACKEND);
                (
                    col.name().to_string(),
                    self.cell(col.ordinal(), kind, type_name),
                )
            })
            .collect()
    }
}
