//! INSERT builder.

use crate::core::connection::Connection;
use crate::core::identifier::quote_pg;
use crate::core::value::{PkValue, SqlValue};
use crate::error::{MapperError, Result};
use crate::query::builder::QueryBuilder;

/// What an insert produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The new row's primary key.
    Inserted(PkValue),
    /// No key was requested; the affected row count.
    Applied(u64),
}

impl InsertOutcome {
    /// The new primary key, failing when none was requested.
    pub fn into_id(self) -> Result<PkValue> {
        match self {
            InsertOutcome::Inserted(id) => Ok(id),
            InsertOutcome::Applied(_) => Err(MapperError::Schema(
                "insert did not return a primary key".into(),
            )),
        }
    }
}

/// Builds `INSERT INTO <table> (...) VALUES (...) [RETURNING <pk>]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertBuilder {
    table: String,
    values: Vec<(String, SqlValue)>,
    returning: Option<String>,
}

impl InsertBuilder {
    /// `table` is already quoted (usually `"schema"."table"`).
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            returning: None,
        }
    }

    pub fn value(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> &mut Self {
        self.values.push((column.into(), value.into()));
        self
    }

    /// Ask for the primary key column back.
    pub fn returning(&mut self, primary_key: impl Into<String>) -> &mut Self {
        self.returning = Some(primary_key.into());
        self
    }

    pub fn build(&self) -> Result<QueryBuilder> {
        let mut query = QueryBuilder::new(format!("INSERT INTO {}", self.table));

        if self.values.is_empty() {
            query.push_sql(" DEFAULT VALUES");
        } else {
            let mut columns = Vec::with_capacity(self.values.len());
            let mut placeholders = Vec::with_capacity(self.values.len());
            for (column, value) in &self.values {
                columns.push(quote_pg(column)?);
                placeholders.push(query.add_param(value.clone()));
            }
            query.push_sql(&format!(
                " ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ));
        }

        if let Some(pk) = &self.returning {
            query.push_sql(&format!(" RETURNING {}", quote_pg(pk)?));
        }

        Ok(query)
    }

    pub async fn execute(&self, conn: &dyn Connection) -> Result<InsertOutcome> {
        let query = self.build()?;
        match &self.returning {
            Some(pk) => {
                let value = query.execute_with_return_field(conn, pk).await?;
                let id = PkValue::from_value(&value).ok_or_else(|| {
                    MapperError::Schema(format!("insert returned an unusable key: {:?}", value))
                })?;
                Ok(InsertOutcome::Inserted(id))
            }
            None => Ok(InsertOutcome::Applied(query.execute_statement(conn).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Record;
    use crate::testing::ScriptedConnection;

    #[test]
    fn test_build_with_returning() {
        let mut insert = InsertBuilder::new("\"public\".\"roles\"");
        insert.value("role", "editor").returning("id");
        let query = insert.build().unwrap();
        assert_eq!(
            query.sql(),
            "INSERT INTO \"public\".\"roles\" (\"role\") VALUES ($1) RETURNING \"id\""
        );
        assert_eq!(query.params(), &[SqlValue::from("editor")]);
    }

    #[test]
    fn test_build_default_values() {
        let query = InsertBuilder::new("t").build().unwrap();
        assert_eq!(query.sql(), "INSERT INTO t DEFAULT VALUES");
    }

    #[tokio::test]
    async fn test_execute_returns_integer_key() {
        let conn = ScriptedConnection::new();
        conn.respond("INSERT", vec![Record::new().with("id", 42i32)]);
        let mut insert = InsertBuilder::new("t");
        insert.value("role", "editor").returning("id");

        let outcome = insert.execute(&conn).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted(PkValue::Int(42)));
    }

    #[tokio::test]
    async fn test_execute_without_key_reports_rows() {
        let conn = ScriptedConnection::new();
        let mut insert = InsertBuilder::new("t");
        insert.value("administrator_id", 5i64).value("role_id", 9i64);

        let outcome = insert.execute(&conn).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Applied(1));
        assert!(outcome.into_id().is_err());
    }
}
