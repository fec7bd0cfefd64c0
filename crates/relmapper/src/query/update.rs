//! UPDATE builder.

use crate::core::connection::Connection;
use crate::core::identifier::quote_pg;
use crate::core::value::SqlValue;
use crate::error::{MapperError, Result};
use crate::query::builder::QueryBuilder;

/// Builds `UPDATE <table> SET ... WHERE ...` and remembers how many rows the
/// last execution touched.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBuilder {
    table: String,
    sets: Vec<(String, SqlValue)>,
    conditions: Vec<(String, SqlValue)>,
    affected_rows: Option<u64>,
}

impl UpdateBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sets: Vec::new(),
            conditions: Vec::new(),
            affected_rows: None,
        }
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> &mut Self {
        self.sets.push((column.into(), value.into()));
        self
    }

    pub fn where_eq(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> &mut Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Rows touched by the last `execute`, if it ran.
    pub fn affected_rows(&self) -> Option<u64> {
        self.affected_rows
    }

    pub fn build(&self) -> Result<QueryBuilder> {
        if self.sets.is_empty() {
            return Err(MapperError::Validation("no changed columns".into()));
        }

        let mut query = QueryBuilder::new(format!("UPDATE {} SET ", self.table));
        for (idx, (column, value)) in self.sets.iter().enumerate() {
            let prefix = if idx == 0 { "" } else { ", " };
            query.add(&format!("{}{} = ", prefix, quote_pg(column)?), Some(value.clone()));
        }
        for (idx, (column, value)) in self.conditions.iter().enumerate() {
            let keyword = if idx == 0 { " WHERE " } else { " AND " };
            query.add(&format!("{}{} = ", keyword, quote_pg(column)?), Some(value.clone()));
        }
        Ok(query)
    }

    pub async fn execute(&mut self, conn: &dyn Connection) -> Result<u64> {
        let affected = self.build()?.execute_statement(conn).await?;
        self.affected_rows = Some(affected);
        Ok(affected)
    }
}
