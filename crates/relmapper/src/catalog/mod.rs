//! Schema catalog reader.
//!
//! Reads column metadata, single-column primary/unique constraints, and enum
//! labels from `pg_catalog`. Nothing here is cached: each mapper reads its
//! table once at construction and keeps the resulting descriptors.

use std::sync::Arc;

use tracing::debug;

use crate::core::connection::Connection;
use crate::core::value::{Record, SqlValue};
use crate::error::{MapperError, Result};

/// Column metadata as it comes out of the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    /// `format_type` output, or the type name for enum types.
    pub sql_type: String,
    pub nullable: bool,
    /// Default expression text, as `pg_get_expr` renders it.
    pub default: Option<String>,
    /// Declared length for `varchar(n)` / `char(n)`.
    pub max_length: Option<u32>,
    pub is_enum: bool,
    /// `GENERATED ... AS IDENTITY`.
    pub is_identity: bool,
}

/// Primary key and unique columns of one table.
///
/// Only single-column keys are reported; a composite primary key leaves
/// `primary_key` empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableConstraints {
    pub primary_key: Option<String>,
    pub unique_columns: Vec<String>,
}

const COLUMNS_SQL: &str = r#"
SELECT a.attname::text AS name,
       CASE WHEN t.typtype = 'e' THEN t.typname::text
            ELSE format_type(a.atttypid, NULL) END AS sql_type,
       NOT a.attnotnull AS nullable,
       pg_get_expr(d.adbin, d.adrelid) AS column_default,
       CASE WHEN t.typcategory = 'S' AND a.atttypmod > 4
            THEN (a.atttypmod - 4)::int4 END AS max_length,
       t.typtype = 'e' AS is_enum,
       a.attidentity IN ('a', 'd') AS is_identity
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname = $1
  AND c.relname = $2
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY a.attnum
"#;

// Covers UNIQUE / PRIMARY KEY constraints and standalone unique indexes alike,
// since both are backed by a pg_index row.
const CONSTRAINTS_SQL: &str = r#"
SELECT a.attname::text AS column_name,
       i.indisprimary AS is_primary
FROM pg_catalog.pg_index i
JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid AND a.attnum = i.indkey[0]
WHERE n.nspname = $1
  AND c.relname = $2
  AND i.indisunique
  AND i.indnatts = 1
  AND i.indpred IS NULL
ORDER BY a.attnum
"#;

const ENUM_LABELS_SQL: &str = r#"
SELECT e.enumlabel::text AS label
FROM pg_catalog.pg_enum e
JOIN pg_catalog.pg_type t ON t.oid = e.enumtypid
WHERE t.typname = $1
ORDER BY e.enumsortorder
"#;

/// Reads table metadata for one schema.
pub struct CatalogReader {
    conn: Arc<dyn Connection>,
    schema: String,
}

impl CatalogReader {
    pub fn new(conn: Arc<dyn Connection>, schema: impl Into<String>) -> Self {
        Self {
            conn,
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Columns of `table` in declaration order.
    ///
    /// Fails with a schema error when the table does not exist (no columns).
    pub async fn get_columns(&self, table: &str) -> Result<Vec<RawColumn>> {
        let rows = self
            .conn
            .query(COLUMNS_SQL, &[self.schema.as_str().into(), table.into()])
            .await?;

        if rows.is_empty() {
            return Err(MapperError::Schema(format!(
                "table {}.{} not found or has no columns",
                self.schema, table
            )));
        }

        let columns = rows
            .iter()
            .map(raw_column_from_record)
            .collect::<Result<Vec<_>>>()?;
        debug!("Loaded {} columns for {}.{}", columns.len(), self.schema, table);
        Ok(columns)
    }

    /// Primary key and unique columns of `table`.
    pub async fn get_constraints(&self, table: &str) -> Result<TableConstraints> {
        let rows = self
            .conn
            .query(CONSTRAINTS_SQL, &[self.schema.as_str().into(), table.into()])
            .await?;

        let mut constraints = TableConstraints::default();
        for row in &rows {
            let column = required_text(row, "column_name")?;
            if row.get_bool("is_primary").unwrap_or(false) {
                constraints.primary_key = Some(column.clone());
            }
            if !constraints.unique_columns.contains(&column) {
                constraints.unique_columns.push(column);
            }
        }

        debug!(
            "Loaded constraints for {}.{}: pk={:?}, unique={:?}",
            self.schema, table, constraints.primary_key, constraints.unique_columns
        );
        Ok(constraints)
    }

    /// Labels of an enum type, in declaration order.
    pub async fn get_enum_labels(&self, type_name: &str) -> Result<Vec<String>> {
        let rows = self
            .conn
            .query(ENUM_LABELS_SQL, &[type_name.into()])
            .await?;

        let labels = rows
            .iter()
            .map(|row| required_text(row, "label"))
            .collect::<Result<Vec<_>>>()?;

        if labels.is_empty() {
            return Err(MapperError::Schema(format!(
                "enum type '{}' has no labels",
                type_name
            )));
        }
        Ok(labels)
    }
}

fn required_text(row: &Record, column: &str) -> Result<String> {
    row.get_str(column)
        .map(str::to_string)
        .ok_or_else(|| MapperError::Schema(format!("catalog row is missing '{}'", column)))
}

fn raw_column_from_record(row: &Record) -> Result<RawColumn> {
    let default = match row.get("column_default") {
        Some(SqlValue::Text(expr)) => Some(expr.clone()),
        _ => None,
    };
    let max_length = row
        .get_i64("max_length")
        .and_then(|len| u32::try_from(len).ok());

    Ok(RawColumn {
        name: required_text(row, "name")?,
        sql_type: required_text(row, "sql_type")?,
        nullable: row.get_bool("nullable").unwrap_or(true),
        default,
        max_length,
        is_enum: row.get_bool("is_enum").unwrap_or(false),
        is_identity: row.get_bool("is_identity").unwrap_or(false),
    })
}
