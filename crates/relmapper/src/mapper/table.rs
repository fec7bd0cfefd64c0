//! Single-table CRUD driven by a table descriptor.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::CatalogReader;
use crate::config::MapperConfig;
use crate::core::connection::Connection;
use crate::core::identifier::quote_pg;
use crate::core::value::{PkValue, Record, SqlValue};
use crate::error::{MapperError, Result};
use crate::filter::FilterExpression;
use crate::mapper::diff;
use crate::query::{InsertBuilder, InsertOutcome, QueryBuilder, SelectBuilder, UpdateBuilder};
use crate::schema::TableDescriptor;

/// CRUD primitives for one table.
///
/// Write entry points reject keys that are not columns of the table.
pub struct TableMapper {
    conn: Arc<dyn Connection>,
    table: TableDescriptor,
}

impl TableMapper {
    /// Introspect `table` and build a mapper for it.
    pub async fn load(
        conn: Arc<dyn Connection>,
        schema: &str,
        table: &str,
        config: &MapperConfig,
    ) -> Result<Self> {
        let catalog = CatalogReader::new(Arc::clone(&conn), schema);
        let descriptor = TableDescriptor::load(&catalog, table, &config.sequence_function).await?;
        Ok(Self::new(conn, descriptor))
    }

    pub fn new(conn: Arc<dyn Connection>, table: TableDescriptor) -> Self {
        Self { conn, table }
    }

    pub fn descriptor(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn connection(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    /// Rows matching `filter`, ordered by `order_by` (or the table's default).
    ///
    /// `columns` is a projection list; `None` selects the whole row.
    pub async fn select(
        &self,
        columns: Option<&str>,
        filter: Option<&FilterExpression>,
        order_by: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Record>> {
        let mut select = SelectBuilder::new(self.table.qualified_name()?)
            .order_by(Some(order_by.unwrap_or(self.table.default_order_by())))
            .limit(limit);
        let projection = match columns {
            Some(columns) => Some(columns.to_string()),
            None => self.table.select_list()?,
        };
        if let Some(columns) = projection {
            select = select.columns(columns);
        }
        if let Some(filter) = filter {
            select = select.filter(filter);
        }
        select.build()?.execute(self.connection()).await
    }

    pub async fn select_by_primary_key(&self, pk: &PkValue) -> Result<Record> {
        let pk_column = self.require_primary_key()?;
        let mut select = SelectBuilder::new(self.table.qualified_name()?)
            .where_eq(self.table.column_sql(pk_column)?, pk.clone());
        if let Some(columns) = self.table.select_list()? {
            select = select.columns(columns);
        }
        let rows = select
            .build()?
            .execute(self.connection())
            .await?;
        rows.into_iter().next().ok_or_else(|| self.not_found(pk))
    }

    /// Insert one row.
    ///
    /// Blank text is replaced by the column's blank value (null, 0, false, or
    /// empty string); blank or null sequence-backed columns are left out so
    /// the sequence supplies them. Returns the new key when the table has one.
    pub async fn insert(&self, values: Record) -> Result<InsertOutcome> {
        self.reject_unknown(&values)?;

        let mut insert = InsertBuilder::new(self.table.qualified_name()?);
        for (column, value) in values {
            let Some(descriptor) = self.table.column(&column) else {
                continue;
            };
            if value.is_blank() || value.is_null() {
                if descriptor.is_sequence_backed() {
                    continue;
                }
                if value.is_blank() {
                    insert.value(column, descriptor.blank_value());
                    continue;
                }
            }
            insert.value(column, value);
        }
        if let Some(pk) = self.table.primary_key() {
            insert.returning(pk);
        }

        let outcome = insert.execute(self.connection()).await?;
        debug!("Inserted into {}: {:?}", self.table.name(), outcome);
        Ok(outcome)
    }

    /// Update the row with primary key `pk`.
    ///
    /// With `compute_diff`, only columns that differ from `known` (or from a
    /// fresh read when `known` is absent or empty) are written, and an empty
    /// diff fails with a "no changed columns" validation error before any
    /// write. Without it, `values` is applied as given. Fails with `NotFound`
    /// when no row matched. The primary key column itself is never written.
    pub async fn update_by_primary_key(
        &self,
        values: &Record,
        pk: &PkValue,
        compute_diff: bool,
        known: Option<&Record>,
    ) -> Result<u64> {
        self.reject_unknown(values)?;
        let pk_column = self.require_primary_key()?;
        let submitted = self.coerce_blanks(values);

        let mut changes = if compute_diff {
            let fetched;
            let stored = match known {
                Some(record) if !record.is_empty() => record,
                _ => {
                    fetched = self.select_by_primary_key(pk).await?;
                    &fetched
                }
            };
            self.changed_columns(&submitted, stored)
        } else {
            submitted
        };
        changes.remove(pk_column);

        if changes.is_empty() {
            return Err(MapperError::Validation("no changed columns".into()));
        }

        let mut update = UpdateBuilder::new(self.table.qualified_name()?);
        for (column, value) in changes {
            update.set(column, value);
        }
        update.where_eq(pk_column, pk.clone());

        let affected = update.execute(self.connection()).await?;
        if affected == 0 {
            return Err(self.not_found(pk));
        }
        debug!("Updated {} {} ({} rows)", self.table.name(), pk, affected);
        Ok(affected)
    }

    /// Delete the row with primary key `pk`, optionally returning one of its
    /// columns. Fails with `NotFound` when no row matched.
    pub async fn delete_by_primary_key(
        &self,
        pk: &PkValue,
        returning: Option<&str>,
    ) -> Result<Option<SqlValue>> {
        let pk_column = self.require_primary_key()?;
        let mut query = QueryBuilder::new(format!("DELETE FROM {}", self.table.qualified_name()?));
        query.add(&format!(" WHERE {} = ", quote_pg(pk_column)?), Some(pk.clone().into()));

        match returning {
            Some(column) => {
                if !self.table.has_column(column) {
                    return Err(self.unknown_column(column));
                }
                query.push_sql(&format!(" RETURNING {}", quote_pg(column)?));
                let value = query
                    .execute_with_return_field(self.connection(), column)
                    .await
                    .map_err(|e| if e.is_not_found() { self.not_found(pk) } else { e })?;
                Ok(Some(value))
            }
            None => {
                if query.execute_statement(self.connection()).await? == 0 {
                    return Err(self.not_found(pk));
                }
                Ok(None)
            }
        }
    }

    /// Delete every row whose columns equal all of `values`.
    ///
    /// `values` must name at least one column; there is no unfiltered delete.
    pub async fn delete_matching(&self, values: &Record) -> Result<u64> {
        let mut query = QueryBuilder::new(format!("DELETE FROM {}", self.table.qualified_name()?));
        self.push_equalities(&mut query, values)?;
        query.execute_statement(self.connection()).await
    }

    /// Count rows whose columns equal all of `values`.
    pub async fn count_matching(&self, values: &Record) -> Result<i64> {
        let mut query = QueryBuilder::new(format!(
            "SELECT count(*) AS \"count\" FROM {}",
            self.table.qualified_name()?
        ));
        self.push_equalities(&mut query, values)?;
        let rows = query.execute(self.connection()).await?;
        Ok(rows.first().and_then(|r| r.get_i64("count")).unwrap_or(0))
    }

    /// Whether any row holds `value` in `column`, optionally ignoring the row
    /// with primary key `except` (for edits of an existing row).
    pub async fn record_exists_for_value(
        &self,
        column: &str,
        value: &SqlValue,
        except: Option<&PkValue>,
    ) -> Result<bool> {
        if !self.table.has_column(column) {
            return Err(self.unknown_column(column));
        }
        let mut query = QueryBuilder::new(format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = ",
            self.table.qualified_name()?,
            quote_pg(column)?
        ));
        query.add("", Some(value.clone()));
        if let Some(pk) = except {
            let pk_column = self.require_primary_key()?;
            query.add(&format!(" AND {} <> ", quote_pg(pk_column)?), Some(pk.clone().into()));
        }
        query.push_sql(") AS \"exists\"");

        let rows = query.execute(self.connection()).await?;
        Ok(rows.first().and_then(|r| r.get_bool("exists")).unwrap_or(false))
    }

    /// Submitted columns that exist in this table and differ from `stored`.
    pub fn changed_columns(&self, submitted: &Record, stored: &Record) -> Record {
        diff::changed_columns(&self.table.column_names(), submitted, stored)
    }

    fn push_equalities(&self, query: &mut QueryBuilder, values: &Record) -> Result<()> {
        if values.is_empty() {
            return Err(MapperError::Validation(format!(
                "no columns to match rows of '{}' on",
                self.table.name()
            )));
        }
        self.reject_unknown(values)?;
        for (idx, (column, value)) in values.iter().enumerate() {
            let keyword = if idx == 0 { " WHERE " } else { " AND " };
            query.add(&format!("{}{} = ", keyword, quote_pg(column)?), Some(value.clone()));
        }
        Ok(())
    }

    fn coerce_blanks(&self, values: &Record) -> Record {
        values
            .iter()
            .map(|(column, value)| {
                let value = match self.table.column(column) {
                    Some(descriptor) if value.is_blank() => descriptor.blank_value(),
                    _ => value.clone(),
                };
                (column, value)
            })
            .collect()
    }

    fn reject_unknown(&self, values: &Record) -> Result<()> {
        match values.keys().find(|key| !self.table.has_column(key)) {
            Some(key) => Err(self.unknown_column(key)),
            None => Ok(()),
        }
    }

    fn require_primary_key(&self) -> Result<&str> {
        self.table.primary_key().ok_or_else(|| {
            MapperError::Schema(format!(
                "table '{}' has no single-column primary key",
                self.table.name()
            ))
        })
    }

    fn not_found(&self, pk: &PkValue) -> MapperError {
        MapperError::NotFound(format!("{} {}", self.table.name(), pk))
    }

    fn unknown_column(&self, column: &str) -> MapperError {
        MapperError::Validation(format!(
            "'{}' is not a column of '{}'",
            column,
            self.table.name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{filter_fields, parse};
    use crate::testing::{
        administrator_roles_table, administrators_table, raw, table, ScriptedConnection,
    };

    fn mapper() -> (Arc<ScriptedConnection>, TableMapper) {
        let conn = Arc::new(ScriptedConnection::new());
        let mapper = TableMapper::new(conn.clone(), administrators_table());
        (conn, mapper)
    }

    fn stored_bob() -> Record {
        Record::new()
            .with("id", 5i64)
            .with("username", "bob")
            .with("name", "Bob")
            .with("email", SqlValue::Null)
            .with("active", true)
    }

    // =========================================================================
    // select
    // =========================================================================

    #[tokio::test]
    async fn test_select_uses_default_order_and_binds_filter() {
        let (conn, mapper) = mapper();
        let fields = filter_fields([("username", "\"administrators\".\"username\"".to_string())]);
        let filter = parse("username:LIKE:b%", &fields).unwrap();

        mapper.select(None, Some(&filter), None, Some(20)).await.unwrap();

        assert_eq!(
            conn.statements()[0],
            "SELECT * FROM \"public\".\"administrators\" WHERE \"administrators\".\"username\" LIKE $1 \
             ORDER BY \"administrators\".\"id\" LIMIT $2"
        );
        assert_eq!(conn.params(0), vec![SqlValue::from("b%"), SqlValue::Int(20)]);
    }

    #[tokio::test]
    async fn test_select_casts_columns_without_native_decoding() {
        let conn = Arc::new(ScriptedConnection::new());
        let devices = table(
            "devices",
            Some("id"),
            &["id"],
            vec![
                raw("id", "integer", false, None),
                raw("address", "inet", true, None),
            ],
        );
        let mapper = TableMapper::new(conn.clone(), devices);
        let row = Record::new().with("id", 1i64).with("address", "10.0.0.1/8");
        conn.respond("FROM", vec![row.clone()]);
        conn.respond("FROM", vec![row]);

        mapper.select(None, None, None, None).await.unwrap();
        let row = mapper.select_by_primary_key(&PkValue::Int(1)).await.unwrap();

        let statements = conn.statements();
        assert_eq!(
            statements[0],
            "SELECT \"devices\".\"id\", \"devices\".\"address\"::text AS \"address\" \
             FROM \"public\".\"devices\" ORDER BY \"devices\".\"id\""
        );
        assert!(statements[1].starts_with(
            "SELECT \"devices\".\"id\", \"devices\".\"address\"::text AS \"address\" FROM"
        ));
        assert_eq!(row.get_str("address"), Some("10.0.0.1/8"));
    }

    #[tokio::test]
    async fn test_select_by_primary_key_not_found() {
        let (_conn, mapper) = mapper();
        let err = mapper.select_by_primary_key(&PkValue::Int(99)).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: administrators 99");
    }

    // =========================================================================
    // insert
    // =========================================================================

    #[tokio::test]
    async fn test_insert_coerces_blanks_and_returns_key() {
        let (conn, mapper) = mapper();
        conn.respond("INSERT", vec![Record::new().with("id", 12i32)]);

        let values = Record::new()
            .with("id", "")
            .with("username", "carol")
            .with("name", "  ")
            .with("active", "");
        let outcome = mapper.insert(values).await.unwrap();

        assert_eq!(outcome, InsertOutcome::Inserted(PkValue::Int(12)));
        assert_eq!(
            conn.statements()[0],
            "INSERT INTO \"public\".\"administrators\" (\"username\", \"name\", \"active\") \
             VALUES ($1, $2, $3) RETURNING \"id\""
        );
        assert_eq!(
            conn.params(0),
            vec![SqlValue::from("carol"), SqlValue::Null, SqlValue::Bool(false)]
        );
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_columns() {
        let (conn, mapper) = mapper();
        let err = mapper
            .insert(Record::new().with("username", "x").with("is_admin", true))
            .await
            .unwrap_err();
        assert!(matches!(err, MapperError::Validation(ref m) if m.contains("is_admin")));
        assert!(conn.statements().is_empty());
    }

    #[tokio::test]
    async fn test_insert_into_keyless_table_reports_rows() {
        let conn = Arc::new(ScriptedConnection::new());
        let join = TableMapper::new(conn.clone(), administrator_roles_table());
        let outcome = join
            .insert(Record::new().with("administrator_id", 5i64).with("role_id", 2i64))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Applied(1));
        assert!(!conn.statements()[0].contains("RETURNING"));
    }

    // =========================================================================
    // update
    // =========================================================================

    #[tokio::test]
    async fn test_update_identical_values_is_empty_diff_without_writes() {
        let (conn, mapper) = mapper();
        let submitted = Record::new()
            .with("username", "bob")
            .with("name", "Bob")
            .with("email", "")
            .with("active", "t");

        let err = mapper
            .update_by_primary_key(&submitted, &PkValue::Int(5), true, Some(&stored_bob()))
            .await
            .unwrap_err();

        assert!(matches!(err, MapperError::Validation(ref m) if m == "no changed columns"));
        assert!(conn.statements().is_empty());
    }

    #[tokio::test]
    async fn test_update_reads_stored_row_when_not_known() {
        let (conn, mapper) = mapper();
        conn.respond("SELECT", vec![stored_bob()]);

        let err = mapper
            .update_by_primary_key(&stored_bob(), &PkValue::Int(5), true, None)
            .await
            .unwrap_err();

        assert!(matches!(err, MapperError::Validation(_)));
        assert_eq!(conn.statements().len(), 1);
        assert_eq!(conn.count("UPDATE"), 0);
    }

    #[tokio::test]
    async fn test_update_writes_only_changed_columns() {
        let (conn, mapper) = mapper();
        let submitted = Record::new()
            .with("username", "bob")
            .with("name", "Robert")
            .with("active", "false");

        mapper
            .update_by_primary_key(&submitted, &PkValue::Int(5), true, Some(&stored_bob()))
            .await
            .unwrap();

        assert_eq!(
            conn.statements()[0],
            "UPDATE \"public\".\"administrators\" SET \"name\" = $1, \"active\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(
            conn.params(0),
            vec![SqlValue::from("Robert"), SqlValue::from("false"), SqlValue::Int(5)]
        );
    }

    #[tokio::test]
    async fn test_update_verbatim_skips_diff() {
        let (conn, mapper) = mapper();
        mapper
            .update_by_primary_key(&stored_bob(), &PkValue::Int(5), false, None)
            .await
            .unwrap();
        let sql = &conn.statements()[0];
        assert!(sql.contains("\"username\" = $1"));
        assert!(!sql.contains("SET \"id\""));
    }

    #[tokio::test]
    async fn test_update_zero_rows_is_not_found() {
        let (conn, mapper) = mapper();
        conn.affect("UPDATE", 0);
        let err = mapper
            .update_by_primary_key(
                &Record::new().with("name", "X"),
                &PkValue::Int(5),
                false,
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    // =========================================================================
    // delete / existence
    // =========================================================================

    #[tokio::test]
    async fn test_delete_returning_column() {
        let (conn, mapper) = mapper();
        conn.respond("DELETE", vec![Record::new().with("username", "bob")]);

        let deleted = mapper
            .delete_by_primary_key(&PkValue::Int(5), Some("username"))
            .await
            .unwrap();

        assert_eq!(deleted, Some(SqlValue::from("bob")));
        assert_eq!(
            conn.statements()[0],
            "DELETE FROM \"public\".\"administrators\" WHERE \"id\" = $1 RETURNING \"username\""
        );
    }

    #[tokio::test]
    async fn test_delete_missing_row_is_not_found() {
        let (conn, mapper) = mapper();
        conn.affect("DELETE", 0);
        let err = mapper.delete_by_primary_key(&PkValue::Int(5), None).await.unwrap_err();
        assert!(err.is_not_found());

        let err = mapper
            .delete_by_primary_key(&PkValue::Int(5), Some("username"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Not found: administrators 5");
    }

    #[tokio::test]
    async fn test_record_exists_for_value_is_stable() {
        let (conn, mapper) = mapper();
        for _ in 0..2 {
            conn.respond("EXISTS", vec![Record::new().with("exists", true)]);
        }
        let value = SqlValue::from("bob");

        let first = mapper
            .record_exists_for_value("username", &value, Some(&PkValue::Int(5)))
            .await
            .unwrap();
        let second = mapper
            .record_exists_for_value("username", &value, Some(&PkValue::Int(5)))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(first);
        assert_eq!(
            conn.statements()[0],
            "SELECT EXISTS (SELECT 1 FROM \"public\".\"administrators\" WHERE \"username\" = $1 \
             AND \"id\" <> $2) AS \"exists\""
        );
        assert_eq!(conn.count("INSERT") + conn.count("UPDATE") + conn.count("DELETE"), 0);
    }

    #[tokio::test]
    async fn test_matching_helpers() {
        let conn = Arc::new(ScriptedConnection::new());
        let join = TableMapper::new(conn.clone(), administrator_roles_table());
        conn.affect("DELETE", 2);
        conn.respond("count", vec![Record::new().with("count", 3i64)]);

        let owner = Record::new().with("administrator_id", 5i64);
        assert_eq!(join.delete_matching(&owner).await.unwrap(), 2);
        assert_eq!(join.count_matching(&owner).await.unwrap(), 3);
        assert_eq!(
            conn.statements()[0],
            "DELETE FROM \"public\".\"administrator_roles\" WHERE \"administrator_id\" = $1"
        );
    }

    #[tokio::test]
    async fn test_matching_helpers_refuse_empty_match() {
        let conn = Arc::new(ScriptedConnection::new());
        let join = TableMapper::new(conn.clone(), administrator_roles_table());

        let err = join.delete_matching(&Record::new()).await.unwrap_err();
        assert!(matches!(err, MapperError::Validation(_)));
        let err = join.count_matching(&Record::new()).await.unwrap_err();
        assert!(matches!(err, MapperError::Validation(_)));
        assert!(conn.statements().is_empty());
    }
}
