//! Table descriptors.

use tracing::info;

use crate::catalog::CatalogReader;
use crate::core::identifier::{qualify_pg, quote_pg, validate_identifier};
use crate::error::{MapperError, Result};
use crate::schema::column::{ColumnDescriptor, ColumnMetadata};

/// Immutable metadata for one table: its columns in order, primary key, and
/// unique columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    schema: String,
    name: String,
    columns: Vec<ColumnDescriptor>,
    primary_key: Option<String>,
    default_order_by: String,
}

impl TableDescriptor {
    /// Assemble a descriptor from already-built columns.
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
        primary_key: Option<String>,
    ) -> Result<Self> {
        let schema = schema.into();
        let name = name.into();
        validate_identifier(&schema)?;
        validate_identifier(&name)?;

        let first = columns
            .first()
            .ok_or_else(|| MapperError::Schema(format!("table '{}' has no columns", name)))?;
        let default_column = primary_key.as_deref().unwrap_or(first.name());
        let default_order_by = format!("{}.{}", quote_pg(&name)?, quote_pg(default_column)?);

        if let Some(pk) = &primary_key {
            if !columns.iter().any(|c| c.name() == pk) {
                return Err(MapperError::Schema(format!(
                    "primary key '{}' is not a column of '{}'",
                    pk, name
                )));
            }
        }

        Ok(Self {
            schema,
            name,
            columns,
            primary_key,
            default_order_by,
        })
    }

    /// Introspect `table` through the catalog.
    pub async fn load(catalog: &CatalogReader, table: &str, sequence_function: &str) -> Result<Self> {
        let raw_columns = catalog.get_columns(table).await?;
        let constraints = catalog.get_constraints(table).await?;

        let mut columns = Vec::with_capacity(raw_columns.len());
        for raw in raw_columns {
            let labels = if raw.is_enum {
                Some(catalog.get_enum_labels(&raw.sql_type).await?)
            } else {
                None
            };
            columns.push(ColumnDescriptor::from_catalog(
                raw,
                &constraints,
                labels,
                sequence_function,
            )?);
        }

        let descriptor = Self::new(
            catalog.schema(),
            table,
            columns,
            constraints.primary_key.clone(),
        )?;
        info!(
            "Mapped table {}.{} ({} columns, pk={})",
            descriptor.schema,
            descriptor.name,
            descriptor.columns.len(),
            descriptor.primary_key.as_deref().unwrap_or("<none>")
        );
        Ok(descriptor)
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(ColumnDescriptor::name).collect()
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Whether `name` is this table's primary key column.
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.as_deref() == Some(name)
    }

    /// Columns with a single-column unique constraint or index.
    pub fn unique_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_unique())
            .map(ColumnDescriptor::name)
            .collect()
    }

    /// `"table"."pk"`, or the first column when there is no primary key.
    pub fn default_order_by(&self) -> &str {
        &self.default_order_by
    }

    /// `"schema"."table"`.
    pub fn qualified_name(&self) -> Result<String> {
        qualify_pg(&self.schema, &self.name)
    }

    /// `"table"."column"`, failing for unknown columns.
    pub fn column_sql(&self, column: &str) -> Result<String> {
        if !self.has_column(column) {
            return Err(MapperError::Validation(format!(
                "'{}' is not a column of '{}'",
                column, self.name
            )));
        }
        Ok(format!("{}.{}", quote_pg(&self.name)?, quote_pg(column)?))
    }

    /// Select-list entry for `column`, optionally renamed to `alias`.
    ///
    /// Columns that do not decode natively are cast to text and keep their
    /// own name.
    pub fn select_sql(&self, column: &str, alias: Option<&str>) -> Result<String> {
        let sql = self.column_sql(column)?;
        let cast = self.column(column).map_or(false, |c| !c.decodes_natively());
        let expr = if cast { format!("{}::text", sql) } else { sql };
        match alias.or(cast.then_some(column)) {
            Some(name) => Ok(format!("{} AS {}", expr, quote_pg(name)?)),
            None => Ok(expr),
        }
    }

    /// Explicit select list for the whole row, or `None` when `*` will do.
    pub fn select_list(&self) -> Result<Option<String>> {
        if self.columns.iter().all(ColumnDescriptor::decodes_natively) {
            return Ok(None);
        }
        let items = self
            .columns
            .iter()
            .map(|c| self.select_sql(c.name(), None))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(items.join(", ")))
    }

    pub fn column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns.iter().map(ColumnDescriptor::metadata).collect()
    }
}
