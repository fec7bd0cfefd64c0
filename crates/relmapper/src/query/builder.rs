//! Base query builder: SQL text plus positional parameters.

use tracing::debug;

use crate::core::connection::Connection;
use crate::core::value::{Record, SqlValue};
use crate::error::{MapperError, Result};

/// SQL text with its bound parameters.
///
/// Placeholders are numbered as parameters are added (`$1`, `$2`, ...), so
/// fragments can be appended in any order without renumbering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    sql: String,
    params: Vec<SqlValue>,
}

impl QueryBuilder {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Append a fragment, followed by a placeholder for `param` when given.
    pub fn add(&mut self, fragment: &str, param: Option<SqlValue>) -> &mut Self {
        self.sql.push_str(fragment);
        if let Some(param) = param {
            let placeholder = self.add_param(param);
            self.sql.push_str(&placeholder);
        }
        self
    }

    /// Append raw SQL text.
    pub fn push_sql(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// Register a parameter and return its placeholder without touching the SQL.
    pub fn add_param(&mut self, param: SqlValue) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    /// Run the statement and return its rows.
    pub async fn execute(&self, conn: &dyn Connection) -> Result<Vec<Record>> {
        debug!("{}", self.sql);
        conn.query(&self.sql, &self.params).await
    }

    /// Run the statement and return the affected row count.
    pub async fn execute_statement(&self, conn: &dyn Connection) -> Result<u64> {
        debug!("{}", self.sql);
        conn.execute(&self.sql, &self.params).await
    }

    /// Run the statement and return `field` from the first returned row.
    ///
    /// Fails with `NotFound` when no row comes back.
    pub async fn execute_with_return_field(
        &self,
        conn: &dyn Connection,
        field: &str,
    ) -> Result<SqlValue> {
        let rows = self.execute(conn).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| MapperError::NotFound("statement returned no row".to_string()))?;
        row.get(field).cloned().ok_or_else(|| {
            MapperError::Schema(format!("returned row has no column '{}'", field))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedConnection;

    #[test]
    fn test_add_numbers_placeholders() {
        let mut query = QueryBuilder::new("SELECT * FROM t WHERE ");
        query
            .add("a = ", Some(SqlValue::Int(1)))
            .add(" AND b = ", Some(SqlValue::from("x")))
            .add(" AND c IS NULL", None);
        assert_eq!(query.sql(), "SELECT * FROM t WHERE a = $1 AND b = $2 AND c IS NULL");
        assert_eq!(query.params(), &[SqlValue::Int(1), SqlValue::from("x")]);
    }

    #[test]
    fn test_add_param_returns_next_placeholder() {
        let mut query = QueryBuilder::new("");
        assert_eq!(query.add_param(SqlValue::Int(1)), "$1");
        assert_eq!(query.add_param(SqlValue::Int(2)), "$2");
        assert_eq!(query.sql(), "");
    }

    #[tokio::test]
    async fn test_execute_with_return_field() {
        let conn = ScriptedConnection::new();
        conn.respond("RETURNING", vec![Record::new().with("username", "bob")]);
        let query = QueryBuilder::new("DELETE FROM t WHERE id = $1 RETURNING username");

        let value = query.execute_with_return_field(&conn, "username").await.unwrap();
        assert_eq!(value, SqlValue::from("bob"));

        let err = query
            .execute_with_return_field(&conn, "username")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
