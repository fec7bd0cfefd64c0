//! Typed entities over the generic mappers.
//!
//! - [`administrators`]: administrators and their roles
//! - [`permissions`]: permissions and the roles granted them
//! - [`roles`]: the role table itself
//! - [`auth`]: per-instance permission annotations

pub mod administrators;
pub mod auth;
pub mod permissions;
pub mod roles;

pub use administrators::{Administrator, AdministratorMapper};
pub use auth::{AuthContext, InstancePermissions};
pub use permissions::{Permission, PermissionMapper};
pub use roles::{Role, RoleMapper};

use serde::Serialize;
use tracing::warn;

use crate::core::identifier::column_ref;
use crate::core::value::{PkValue, Record};
use crate::error::{MapperError, Result};
use crate::filter::{FilterExpression, FilterFields, FilterValue, Operator};
use crate::mapper::TableMapper;

pub(crate) const ID: &str = "id";
pub(crate) const ROLE: &str = "role";
pub(crate) const ROLE_ID: &str = "role_id";

/// A list read for display.
///
/// When the database rejects the list query the view is empty and carries a
/// notice instead of failing the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListView<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl<T> ListView<T> {
    pub(crate) fn degrade(result: Result<Vec<T>>, what: &str) -> Result<Self> {
        match result {
            Ok(items) => Ok(Self { items, notice: None }),
            Err(e) if e.is_query_failure() => {
                warn!("Listing {} failed: {}", what, e);
                Ok(Self {
                    items: Vec::new(),
                    notice: Some(format!("The {} list could not be loaded.", what)),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// A filterable field: display name, table, column.
pub type FieldSpec = (&'static str, &'static str, &'static str);

/// Resolve field specs against loaded tables. A table or column that is not
/// there is a schema error.
pub(crate) fn whitelist(specs: &[FieldSpec], tables: &[&TableMapper]) -> Result<FilterFields> {
    let mut fields = FilterFields::new();
    for (display, table, column) in specs {
        let mapper = tables
            .iter()
            .find(|mapper| mapper.name() == *table)
            .ok_or_else(|| MapperError::Schema(format!("no mapper for table '{}'", table)))?;
        let sql = mapper.descriptor().column_sql(column).map_err(|_| {
            MapperError::Schema(format!("'{}' has no column '{}'", table, column))
        })?;
        fields.insert(display.to_string(), sql);
    }
    Ok(fields)
}

/// Field specs as a whitelist, without consulting the catalog.
pub fn declared_fields(specs: &[FieldSpec]) -> Result<FilterFields> {
    specs
        .iter()
        .map(|(display, table, column)| Ok((display.to_string(), column_ref(table, column)?)))
        .collect()
}

pub(crate) fn require_pk(record: &Record, column: &str, what: &str) -> Result<PkValue> {
    record
        .get(column)
        .and_then(PkValue::from_value)
        .ok_or_else(|| MapperError::DataModel(format!("{} row has no '{}'", what, column)))
}

pub(crate) fn require_text(record: &Record, column: &str, what: &str) -> Result<String> {
    record
        .get_str(column)
        .map(str::to_string)
        .ok_or_else(|| MapperError::DataModel(format!("{} row has no '{}'", what, column)))
}

/// Id of the role named `name` in `roles`, if any.
pub(crate) async fn find_role_id(roles: &TableMapper, name: &str) -> Result<Option<PkValue>> {
    let mut filter = FilterExpression::new();
    filter.push(
        &roles.descriptor().column_sql(ROLE)?,
        Operator::Eq,
        FilterValue::Text(name.to_string()),
    );
    let rows = roles.select(None, Some(&filter), None, Some(1)).await?;
    Ok(rows.first().and_then(|row| row.get(ID)).and_then(PkValue::from_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::testing::{roles_table, ScriptedConnection};

    #[test]
    fn test_degrade_passes_through_other_errors() {
        let ok: ListView<i32> = ListView::degrade(Ok(vec![1, 2]), "things").unwrap();
        assert_eq!(ok.items, vec![1, 2]);
        assert!(ok.notice.is_none());

        let err = ListView::<i32>::degrade(Err(MapperError::filter("name", "unknown field")), "things");
        assert!(matches!(err, Err(MapperError::Filter { .. })));
    }

    #[test]
    fn test_whitelist_requires_columns() {
        let conn = Arc::new(ScriptedConnection::new());
        let roles = TableMapper::new(conn, roles_table());

        let fields = whitelist(&[("name", "roles", "role")], &[&roles]).unwrap();
        assert_eq!(fields.get("name").map(String::as_str), Some("\"roles\".\"role\""));

        let err = whitelist(&[("title", "roles", "title")], &[&roles]).unwrap_err();
        assert!(matches!(err, MapperError::Schema(_)));
        let err = whitelist(&[("title", "permissions", "title")], &[&roles]).unwrap_err();
        assert!(matches!(err, MapperError::Schema(_)));
    }

    #[test]
    fn test_declared_fields_match_loaded_ones() {
        let conn = Arc::new(ScriptedConnection::new());
        let roles = TableMapper::new(conn, roles_table());
        let specs: &[FieldSpec] = &[("id", "roles", "id"), ("role", "roles", "role")];

        assert_eq!(declared_fields(specs).unwrap(), whitelist(specs, &[&roles]).unwrap());
    }

    #[tokio::test]
    async fn test_find_role_id() {
        let conn = Arc::new(ScriptedConnection::new());
        conn.respond("SELECT", vec![Record::new().with("id", 1i64).with("role", "owner")]);
        let roles = TableMapper::new(conn.clone(), roles_table());

        assert_eq!(find_role_id(&roles, "owner").await.unwrap(), Some(PkValue::Int(1)));
        assert_eq!(find_role_id(&roles, "ghost").await.unwrap(), None);
        assert!(conn.statements()[0].contains("WHERE \"roles\".\"role\" = $1"));
        assert_eq!(conn.params(0)[0], crate::core::value::SqlValue::from("owner"));
    }
}
