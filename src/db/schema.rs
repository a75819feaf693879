//! Schema introspection.
//!
//! Each backend implements [`Catalog`] over its own pool type: four reads
//! against the system catalog. [`SchemaInspector`] assembles them into the
//! shared [`TableSchema`] model, so introspected tables look exactly like
//! tables parsed out of a dump.

use crate::db::pool::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{ColumnDefinition, DatabaseSchema, ForeignKey, IndexInfo, TableSchema};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Catalog reads for one backend.
#[async_trait]
trait Catalog: Sync {
    /// Base tables of the current database or schema, sorted.
    async fn table_names(&self) -> AppResult<Vec<String>>;

    /// Columns in declaration order. Empty when the table does not exist.
    async fn columns(&self, table: &str) -> AppResult<Vec<ColumnDefinition>>;

    async fn foreign_keys(&self, table: &str) -> AppResult<Vec<ForeignKey>>;

    async fn indexes(&self, table: &str) -> AppResult<Vec<IndexInfo>>;
}

fn catalog(pool: &DbPool) -> &dyn Catalog {
    match pool {
        DbPool::MySql(p) => p,
        DbPool::Postgres(p) => p,
        DbPool::SQLite(p) => p,
    }
}

pub struct SchemaInspector;

impl SchemaInspector {
    pub async fn list_tables(pool: &DbPool) -> AppResult<Vec<String>> {
        let tables = catalog(pool).table_names().await?;
        debug!(backend = %pool.db_type(), count = tables.len(), "Listed tables");
        Ok(tables)
    }

    /// Columns, keys and indexes of one table.
    ///
    /// Missing tables are a schema error. Foreign key and index lookups are
    /// best effort: a failing catalog read leaves that part empty.
    pub async fn describe_table(pool: &DbPool, table: &str) -> AppResult<TableSchema> {
        let catalog = catalog(pool);
        let columns = catalog.columns(table).await?;
        if columns.is_empty() {
            return Err(AppError::schema(
                format!("Table '{table}' not found"),
                table,
            ));
        }

        let mut schema = TableSchema::new(table);
        schema.columns = columns;
        schema.foreign_keys = catalog.foreign_keys(table).await.unwrap_or_else(|e| {
            warn!(table, error = %e, "Foreign key lookup failed");
            Vec::new()
        });
        schema.indexes = catalog.indexes(table).await.unwrap_or_else(|e| {
            warn!(table, error = %e, "Index lookup failed");
            Vec::new()
        });
        schema.derive_primary_key();
        Ok(schema)
    }

    /// Describe every table. A table that fails to describe is skipped with a
    /// warning so one broken object does not block indexing.
    pub async fn full_schema(pool: &DbPool) -> AppResult<DatabaseSchema> {
        let mut schema = DatabaseSchema::new();
        for table in Self::list_tables(pool).await? {
            match Self::describe_table(pool, &table).await {
                Ok(described) => {
                    schema.insert(table, described);
                }
                Err(e) => warn!(table = %table, error = %e, "Skipping table"),
            }
        }
        debug!(count = schema.len(), "Collected database schema");
        Ok(schema)
    }
}

/// One column pair of a foreign key, as the catalogs report it.
struct ForeignKeyPart {
    constraint: Option<String>,
    column: String,
    references_table: String,
    references_column: String,
}

/// Fold per-column catalog rows into one [`ForeignKey`] per constraint,
/// keeping the order in which constraints first appear.
fn group_foreign_keys(parts: Vec<ForeignKeyPart>) -> Vec<ForeignKey> {
    let mut keys: Vec<ForeignKey> = Vec::new();
    for part in parts {
        let existing = part.constraint.as_ref().and_then(|name| {
            keys.iter_mut().find(|fk| {
                fk.name.as_ref() == Some(name) && fk.references_table == part.references_table
            })
        });
        match existing {
            Some(fk) => {
                fk.columns.push(part.column);
                fk.references_columns.push(part.references_column);
            }
            None => {
                let mut fk = ForeignKey::new(
                    vec![part.column],
                    part.references_table,
                    vec![part.references_column],
                );
                fk.name = part.constraint;
                keys.push(fk);
            }
        }
    }
    keys
}

/// One column of an index, in position order within the index.
struct IndexPart {
    index: String,
    column: String,
    unique: bool,
    primary: bool,
}

fn group_indexes(parts: Vec<IndexPart>) -> Vec<IndexInfo> {
    let mut indexes: Vec<IndexInfo> = Vec::new();
    for part in parts {
        match indexes.iter_mut().find(|i| i.name == part.index) {
            Some(index) => index.columns.push(part.column),
            None => indexes.push(
                IndexInfo::new(part.index, vec![part.column])
                    .with_unique(part.unique)
                    .with_primary(part.primary),
            ),
        }
    }
    indexes
}

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    const TABLES: &str = "SELECT tablename::text AS name FROM pg_catalog.pg_tables \
                          WHERE schemaname = current_schema() ORDER BY tablename";

    const COLUMNS: &str = r#"
        SELECT a.attname::text AS name,
               format_type(a.atttypid, a.atttypmod) AS data_type,
               NOT a.attnotnull AS nullable,
               pg_get_expr(d.adbin, d.adrelid) AS default_value,
               COALESCE(bool_or(i.indisprimary), false) AS primary_key
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        LEFT JOIN pg_index i ON i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey)
        WHERE c.relname = $1 AND n.nspname = current_schema()
          AND c.relkind IN ('r', 'p') AND a.attnum > 0 AND NOT a.attisdropped
        GROUP BY a.attnum, a.attname, a.atttypid, a.atttypmod, a.attnotnull, d.adbin, d.adrelid
        ORDER BY a.attnum
    "#;

    const FOREIGN_KEYS: &str = r#"
        SELECT con.conname::text AS constraint_name,
               att.attname::text AS column_name,
               ref.relname::text AS references_table,
               ratt.attname::text AS references_column
        FROM pg_constraint con
        JOIN pg_class cl ON cl.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = cl.relnamespace
        JOIN pg_class ref ON ref.oid = con.confrelid
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(col, refcol, ord)
        JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.col
        JOIN pg_attribute ratt ON ratt.attrelid = con.confrelid AND ratt.attnum = k.refcol
        WHERE con.contype = 'f' AND cl.relname = $1 AND n.nspname = current_schema()
        ORDER BY con.conname, k.ord
    "#;

    const INDEXES: &str = r#"
        SELECT ic.relname::text AS index_name,
               a.attname::text AS column_name,
               ix.indisunique AS is_unique,
               ix.indisprimary AS is_primary
        FROM pg_index ix
        JOIN pg_class ic ON ic.oid = ix.indexrelid
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE t.relname = $1 AND n.nspname = current_schema()
        ORDER BY ic.relname, k.ord
    "#;

    #[async_trait]
    impl Catalog for PgPool {
        async fn table_names(&self) -> AppResult<Vec<String>> {
            Ok(sqlx::query_scalar(TABLES).fetch_all(self).await?)
        }

        async fn columns(&self, table: &str) -> AppResult<Vec<ColumnDefinition>> {
            let rows = sqlx::query(COLUMNS).bind(table).fetch_all(self).await?;
            rows.iter()
                .map(|row| -> AppResult<ColumnDefinition> {
                    let mut column = ColumnDefinition::new(
                        row.try_get::<String, _>("name")?,
                        row.try_get::<String, _>("data_type")?,
                        row.try_get("nullable")?,
                    )
                    .with_primary_key(row.try_get("primary_key")?);
                    column.default_value = row.try_get("default_value")?;
                    Ok(column)
                })
                .collect()
        }

        async fn foreign_keys(&self, table: &str) -> AppResult<Vec<ForeignKey>> {
            let rows = sqlx::query(FOREIGN_KEYS).bind(table).fetch_all(self).await?;
            let parts = rows
                .iter()
                .map(|row| -> AppResult<ForeignKeyPart> {
                    Ok(ForeignKeyPart {
                        constraint: row.try_get("constraint_name")?,
                        column: row.try_get("column_name")?,
                        references_table: row.try_get("references_table")?,
                        references_column: row.try_get("references_column")?,
                    })
                })
                .collect::<AppResult<Vec<_>>>()?;
            Ok(group_foreign_keys(parts))
        }

        async fn indexes(&self, table: &str) -> AppResult<Vec<IndexInfo>> {
            let rows = sqlx::query(INDEXES).bind(table).fetch_all(self).await?;
            let parts = rows
                .iter()
                .map(|row| -> AppResult<IndexPart> {
                    Ok(IndexPart {
                        index: row.try_get("index_name")?,
                        column: row.try_get("column_name")?,
                        unique: row.try_get("is_unique")?,
                        primary: row.try_get("is_primary")?,
                    })
                })
                .collect::<AppResult<Vec<_>>>()?;
            Ok(group_indexes(parts))
        }
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlPool, Row};

    const TABLES: &str = "SELECT CAST(TABLE_NAME AS CHAR) AS name FROM information_schema.TABLES \
                          WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
                          ORDER BY TABLE_NAME";

    const COLUMNS: &str = r#"
        SELECT CAST(COLUMN_NAME AS CHAR) AS name,
               CAST(COLUMN_TYPE AS CHAR) AS data_type,
               CAST(IS_NULLABLE AS CHAR) AS nullable,
               CAST(COLUMN_DEFAULT AS CHAR) AS default_value,
               CAST(COLUMN_KEY AS CHAR) AS column_key
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    const FOREIGN_KEYS: &str = r#"
        SELECT CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name,
               CAST(COLUMN_NAME AS CHAR) AS column_name,
               CAST(REFERENCED_TABLE_NAME AS CHAR) AS references_table,
               CAST(REFERENCED_COLUMN_NAME AS CHAR) AS references_column
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
          AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
    "#;

    const INDEXES: &str = r#"
        SELECT CAST(INDEX_NAME AS CHAR) AS index_name,
               CAST(COLUMN_NAME AS CHAR) AS column_name,
               CAST(NON_UNIQUE AS SIGNED) AS non_unique
        FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        ORDER BY INDEX_NAME, SEQ_IN_INDEX
    "#;

    /// Catalog text may arrive as VARBINARY depending on the server charset.
    fn text(row: &MySqlRow, column: &str) -> Option<String> {
        match row.try_get::<Option<String>, _>(column) {
            Ok(value) => value,
            Err(_) => row
                .try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok()),
        }
    }

    fn text_or_empty(row: &MySqlRow, column: &str) -> String {
        text(row, column).unwrap_or_default()
    }

    #[async_trait]
    impl Catalog for MySqlPool {
        async fn table_names(&self) -> AppResult<Vec<String>> {
            let rows = sqlx::query(TABLES).fetch_all(self).await?;
            Ok(rows.iter().filter_map(|row| text(row, "name")).collect())
        }

        async fn columns(&self, table: &str) -> AppResult<Vec<ColumnDefinition>> {
            let rows = sqlx::query(COLUMNS).bind(table).fetch_all(self).await?;
            Ok(rows
                .iter()
                .map(|row| {
                    let mut column = ColumnDefinition::new(
                        text_or_empty(row, "name"),
                        text_or_empty(row, "data_type"),
                        text_or_empty(row, "nullable") == "YES",
                    )
                    .with_primary_key(text_or_empty(row, "column_key") == "PRI");
                    column.default_value = text(row, "default_value");
                    column
                })
                .collect())
        }

        async fn foreign_keys(&self, table: &str) -> AppResult<Vec<ForeignKey>> {
            let rows = sqlx::query(FOREIGN_KEYS).bind(table).fetch_all(self).await?;
            let parts = rows
                .iter()
                .map(|row| ForeignKeyPart {
                    constraint: text(row, "constraint_name"),
                    column: text_or_empty(row, "column_name"),
                    references_table: text_or_empty(row, "references_table"),
                    references_column: text_or_empty(row, "references_column"),
                })
                .collect();
            Ok(group_foreign_keys(parts))
        }

        async fn indexes(&self, table: &str) -> AppResult<Vec<IndexInfo>> {
            let rows = sqlx::query(INDEXES).bind(table).fetch_all(self).await?;
            let parts = rows
                .iter()
                .filter_map(|row| {
                    let index = text(row, "index_name")?;
                    Some(IndexPart {
                        primary: index == "PRIMARY",
                        unique: row.try_get::<i64, _>("non_unique").is_ok_and(|n| n == 0),
                        column: text(row, "column_name")?,
                        index,
                    })
                })
                .collect();
            Ok(group_indexes(parts))
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    const TABLES: &str = "SELECT name FROM sqlite_master \
                          WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

    const COLUMNS: &str =
        r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#;

    const FOREIGN_KEYS: &str =
        r#"SELECT id, "from", "table", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#;

    const INDEXES: &str = r#"
        SELECT il.name AS index_name, ii.name AS column_name,
               il."unique" AS is_unique, il.origin AS origin
        FROM pragma_index_list(?1) AS il
        JOIN pragma_index_info(il.name) AS ii
        ORDER BY il.name, ii.seqno
    "#;

    #[async_trait]
    impl Catalog for SqlitePool {
        async fn table_names(&self) -> AppResult<Vec<String>> {
            Ok(sqlx::query_scalar(TABLES).fetch_all(self).await?)
        }

        async fn columns(&self, table: &str) -> AppResult<Vec<ColumnDefinition>> {
            let rows = sqlx::query(COLUMNS).bind(table).fetch_all(self).await?;
            rows.iter()
                .map(|row| -> AppResult<ColumnDefinition> {
                    let not_null: i64 = row.try_get("notnull")?;
                    let pk_position: i64 = row.try_get("pk")?;
                    let mut column = ColumnDefinition::new(
                        row.try_get::<String, _>("name")?,
                        row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                        not_null == 0,
                    )
                    .with_primary_key(pk_position > 0);
                    column.default_value = row.try_get("dflt_value")?;
                    Ok(column)
                })
                .collect()
        }

        async fn foreign_keys(&self, table: &str) -> AppResult<Vec<ForeignKey>> {
            let rows = sqlx::query(FOREIGN_KEYS).bind(table).fetch_all(self).await?;
            // constraints are unnamed; the id groups composite keys
            let parts = rows
                .iter()
                .map(|row| -> AppResult<ForeignKeyPart> {
                    let id: i64 = row.try_get("id")?;
                    let references_table: String = row.try_get("table")?;
                    Ok(ForeignKeyPart {
                        constraint: Some(format!("fk_{table}_{references_table}_{id}")),
                        column: row.try_get("from")?,
                        references_column: row
                            .try_get::<Option<String>, _>("to")?
                            .unwrap_or_default(),
                        references_table,
                    })
                })
                .collect::<AppResult<Vec<_>>>()?;
            Ok(group_foreign_keys(parts))
        }

        async fn indexes(&self, table: &str) -> AppResult<Vec<IndexInfo>> {
            let rows = sqlx::query(INDEXES).bind(table).fetch_all(self).await?;
            let parts = rows
                .iter()
                .filter_map(|row| {
                    // expression columns have no name
                    let column: Option<String> = row.try_get("column_name").ok().flatten();
                    Some(IndexPart {
                        index: row.try_get("index_name").ok()?,
                        column: column?,
                        unique: row.try_get::<i64, _>("is_unique").is_ok_and(|u| u != 0),
                        primary: row
                            .try_get::<String, _>("origin")
                            .is_ok_and(|origin| origin == "pk"),
                    })
                })
                .collect();
            Ok(group_indexes(parts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk_part(constraint: Option<&str>, column: &str, table: &str, referred: &str) -> ForeignKeyPart {
        ForeignKeyPart {
            constraint: constraint.map(String::from),
            column: column.to_string(),
            references_table: table.to_string(),
            references_column: referred.to_string(),
        }
    }

    #[test]
    fn test_group_foreign_keys_composite() {
        let keys = group_foreign_keys(vec![
            fk_part(Some("fk_line_order"), "order_id", "orders", "id"),
            fk_part(Some("fk_line_product"), "product_id", "products", "id"),
            fk_part(Some("fk_line_order"), "order_rev", "orders", "rev"),
        ]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].columns, vec!["order_id", "order_rev"]);
        assert_eq!(keys[0].references_columns, vec!["id", "rev"]);
        assert_eq!(keys[1].references_table, "products");
    }

    #[test]
    fn test_group_foreign_keys_unnamed_stay_separate() {
        let keys = group_foreign_keys(vec![
            fk_part(None, "a", "t", "x"),
            fk_part(None, "b", "t", "y"),
        ]);
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|fk| fk.name.is_none()));
    }

    #[test]
    fn test_group_indexes() {
        let part = |index: &str, column: &str, unique, primary| IndexPart {
            index: index.to_string(),
            column: column.to_string(),
            unique,
            primary,
        };
        let indexes = group_indexes(vec![
            part("PRIMARY", "id", true, true),
            part("idx_name_city", "name", false, false),
            part("idx_name_city", "city", false, false),
        ]);
        assert_eq!(indexes.len(), 2);
        assert!(indexes[0].is_primary);
        assert_eq!(indexes[1].columns, vec!["name", "city"]);
        assert!(!indexes[1].is_unique);
    }
}
