//! Roles, and the rules for renaming and deleting them.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::MapperConfig;
use crate::core::connection::Connection;
use crate::core::value::{PkValue, Record, SqlValue};
use crate::domain::{
    find_role_id, require_pk, require_text, whitelist, FieldSpec, ListView, ID, ROLE, ROLE_ID,
};
use crate::error::{MapperError, Result};
use crate::filter::{self, FilterFields};
use crate::mapper::{transaction, TableMapper};

pub const ROLES: &str = "roles";

/// Fields a role list can be filtered on.
pub const FILTER_FIELDS: &[FieldSpec] = &[("id", ROLES, ID), ("role", ROLES, ROLE)];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: PkValue,
    pub role: String,
}

impl Role {
    pub(crate) fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: require_pk(record, ID, ROLES)?,
            role: require_text(record, ROLE, ROLES)?,
        })
    }
}

/// Single-table mapper for `roles`.
///
/// Also holds the join tables that reference roles, so a role still in use
/// is never deleted out from under them.
pub struct RoleMapper {
    roles: TableMapper,
    assignments: Vec<TableMapper>,
    fields: FilterFields,
    top_role: String,
    list_limit: Option<u32>,
}

impl RoleMapper {
    pub async fn load(conn: Arc<dyn Connection>, schema: &str, config: &MapperConfig) -> Result<Self> {
        let roles = TableMapper::load(Arc::clone(&conn), schema, ROLES, config).await?;
        let administrator_roles =
            TableMapper::load(Arc::clone(&conn), schema, "administrator_roles", config).await?;
        let roles_permissions = TableMapper::load(conn, schema, "roles_permissions", config).await?;
        Self::new(roles, vec![administrator_roles, roles_permissions], config)
    }

    /// `assignments` are join tables with a `role_id` column.
    pub fn new(roles: TableMapper, assignments: Vec<TableMapper>, config: &MapperConfig) -> Result<Self> {
        if let Some(join) = assignments
            .iter()
            .find(|join| !join.descriptor().has_column(ROLE_ID))
        {
            return Err(MapperError::Schema(format!(
                "'{}' has no '{}' column",
                join.name(),
                ROLE_ID
            )));
        }
        let fields = whitelist(FILTER_FIELDS, &[&roles])?;

        info!("Role mapper ready ({} assignment tables)", assignments.len());
        Ok(Self {
            roles,
            assignments,
            fields,
            top_role: config.top_role.clone(),
            list_limit: config.list_limit,
        })
    }

    pub fn filter_fields(&self) -> &FilterFields {
        &self.fields
    }

    pub fn top_role(&self) -> &str {
        &self.top_role
    }

    pub async fn get_objects(&self, filter: &str, order_by: Option<&str>) -> Result<Vec<Role>> {
        let filter = filter::parse(filter, &self.fields)?;
        self.roles
            .select(None, Some(&filter), order_by, self.list_limit)
            .await?
            .iter()
            .map(Role::from_record)
            .collect()
    }

    pub async fn list_view(&self, filter: &str, order_by: Option<&str>) -> Result<ListView<Role>> {
        ListView::degrade(self.get_objects(filter, order_by).await, ROLES)
    }

    pub async fn get(&self, id: &PkValue) -> Result<Role> {
        Role::from_record(&self.roles.select_by_primary_key(id).await?)
    }

    pub async fn role_id_by_name(&self, name: &str) -> Result<Option<PkValue>> {
        find_role_id(&self.roles, name).await
    }

    pub async fn name_exists(&self, name: &str, except: Option<&PkValue>) -> Result<bool> {
        self.roles
            .record_exists_for_value(ROLE, &SqlValue::from(name), except)
            .await
    }

    pub async fn create(&self, name: &str) -> Result<PkValue> {
        if self.name_exists(name, None).await? {
            return Err(MapperError::Validation(format!("role '{}' already exists", name)));
        }
        self.roles
            .insert(Record::new().with(ROLE, name))
            .await?
            .into_id()
    }

    /// Rename a role. The top role keeps its name.
    pub async fn rename(&self, id: &PkValue, name: &str) -> Result<()> {
        let stored = self.roles.select_by_primary_key(id).await?;
        let current = Role::from_record(&stored)?;
        if current.role == self.top_role {
            return Err(MapperError::Validation(format!(
                "the '{}' role cannot be renamed",
                self.top_role
            )));
        }
        if self.name_exists(name, Some(id)).await? {
            return Err(MapperError::Validation(format!("role '{}' already exists", name)));
        }
        self.roles
            .update_by_primary_key(&Record::new().with(ROLE, name), id, true, Some(&stored))
            .await?;
        Ok(())
    }

    /// Delete an unused role other than the top role. Returns its name.
    ///
    /// The usage check and the delete share one transaction.
    pub async fn delete(&self, id: &PkValue) -> Result<String> {
        let role = self.get(id).await?;
        if role.role == self.top_role {
            return Err(MapperError::Validation(format!(
                "the '{}' role cannot be deleted",
                self.top_role
            )));
        }

        let operation = format!("delete role {}", id);
        let usage = Record::new().with(ROLE_ID, SqlValue::from(id.clone()));
        let deleted = transaction::run(self.roles.connection(), &operation, async {
            for join in &self.assignments {
                if join.count_matching(&usage).await? > 0 {
                    return Err(MapperError::Validation(format!(
                        "role '{}' is still referenced by {}",
                        role.role,
                        join.name()
                    )));
                }
            }
            self.roles.delete_by_primary_key(id, Some(ROLE)).await
        })
        .await?;

        Ok(deleted
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or(role.role))
    }
}
