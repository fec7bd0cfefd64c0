//! Permissions and the roles granted them.
//!
//! The top role is granted every permission: it is added on create and never
//! removed on update.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::MapperConfig;
use crate::core::connection::Connection;
use crate::core::value::{PkValue, Record};
use crate::domain::roles::{Role, ROLES};
use crate::domain::{
    find_role_id, require_pk, require_text, whitelist, FieldSpec, ListView, ID, ROLE, ROLE_ID,
};
use crate::error::{MapperError, Result};
use crate::filter::{self, FilterFields};
use crate::mapper::{ChangeSet, Entity, MultiTableMapper, TableMapper};

pub const PERMISSIONS: &str = "permissions";
pub const ROLES_PERMISSIONS: &str = "roles_permissions";
const PERMISSION_ID: &str = "permission_id";
const TITLE: &str = "title";

/// Fields a permission list can be filtered on.
pub const FILTER_FIELDS: &[FieldSpec] = &[
    ("id", PERMISSIONS, ID),
    ("title", PERMISSIONS, TITLE),
    ("description", PERMISSIONS, "description"),
    ("role", ROLES, ROLE),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Permission {
    pub id: PkValue,
    pub title: String,
    pub fields: Record,
    pub roles: Vec<Role>,
}

impl Permission {
    fn from_entity(entity: Entity) -> Result<Self> {
        let (fields, associations) = entity.into_parts();
        Ok(Self {
            id: require_pk(&fields, ID, PERMISSIONS)?,
            title: require_text(&fields, TITLE, PERMISSIONS)?,
            roles: associations
                .iter()
                .map(Role::from_record)
                .collect::<Result<_>>()?,
            fields,
        })
    }

    pub fn role_ids(&self) -> Vec<PkValue> {
        self.roles.iter().map(|role| role.id.clone()).collect()
    }
}

pub struct PermissionMapper {
    entities: MultiTableMapper,
    fields: FilterFields,
    top_role: String,
    list_limit: Option<u32>,
}

impl PermissionMapper {
    pub async fn load(conn: Arc<dyn Connection>, schema: &str, config: &MapperConfig) -> Result<Self> {
        let permissions = TableMapper::load(Arc::clone(&conn), schema, PERMISSIONS, config).await?;
        let roles_permissions =
            TableMapper::load(Arc::clone(&conn), schema, ROLES_PERMISSIONS, config).await?;
        let roles = TableMapper::load(conn, schema, ROLES, config).await?;
        Self::new(permissions, roles_permissions, roles, config)
    }

    pub fn new(
        permissions: TableMapper,
        roles_permissions: TableMapper,
        roles: TableMapper,
        config: &MapperConfig,
    ) -> Result<Self> {
        let entities =
            MultiTableMapper::new(permissions, roles_permissions, roles, PERMISSION_ID, ROLE_ID)?;
        let fields = whitelist(FILTER_FIELDS, &[entities.primary(), entities.target()])?;

        info!("Permission mapper ready ({} filter fields)", fields.len());
        Ok(Self {
            entities,
            fields,
            top_role: config.top_role.clone(),
            list_limit: config.list_limit,
        })
    }

    pub fn filter_fields(&self) -> &FilterFields {
        &self.fields
    }

    pub fn entities(&self) -> &MultiTableMapper {
        &self.entities
    }

    pub async fn get_objects(&self, filter: &str, order_by: Option<&str>) -> Result<Vec<Permission>> {
        let filter = filter::parse(filter, &self.fields)?;
        self.entities
            .get_entities(Some(&filter), order_by, self.list_limit)
            .await?
            .into_iter()
            .map(Permission::from_entity)
            .collect()
    }

    pub async fn list_view(&self, filter: &str, order_by: Option<&str>) -> Result<ListView<Permission>> {
        ListView::degrade(self.get_objects(filter, order_by).await, PERMISSIONS)
    }

    pub async fn get(&self, id: &PkValue) -> Result<Permission> {
        Permission::from_entity(self.entities.get_entity(id).await?)
    }

    async fn top_role_id(&self) -> Result<PkValue> {
        find_role_id(self.entities.target(), &self.top_role)
            .await?
            .ok_or_else(|| {
                MapperError::DataModel(format!("the '{}' role does not exist", self.top_role))
            })
    }

    /// Insert a permission granted to `role_ids` plus the top role.
    pub async fn create(&self, values: Record, role_ids: &[PkValue]) -> Result<PkValue> {
        let top = self.top_role_id().await?;
        let mut ids = role_ids.to_vec();
        if !ids.contains(&top) {
            ids.push(top);
        }
        let id = self.entities.create(values, &ids).await?;
        info!("Created permission {}", id);
        Ok(id)
    }

    pub async fn change_set(&self, id: &PkValue, submitted: &Record, role_ids: &[PkValue]) -> Result<ChangeSet> {
        let stored = self.entities.get_entity(id).await?;
        let mut change = self.entities.change_set(submitted, role_ids, &stored);
        self.protect_top_role(&mut change).await?;
        Ok(change)
    }

    /// Apply submitted input. Returns `false` when nothing changed.
    pub async fn update(&self, id: &PkValue, submitted: &Record, role_ids: &[PkValue]) -> Result<bool> {
        let change = self.change_set(id, submitted, role_ids).await?;
        if change.is_empty() {
            return Ok(false);
        }
        self.entities.do_update(id, &change).await?;
        Ok(true)
    }

    /// Apply a change set, never revoking the top role.
    pub async fn do_update(&self, id: &PkValue, change: &ChangeSet) -> Result<()> {
        let mut change = change.clone();
        self.protect_top_role(&mut change).await?;
        self.entities.do_update(id, &change).await
    }

    async fn protect_top_role(&self, change: &mut ChangeSet) -> Result<()> {
        if change.associations.remove.is_empty() {
            return Ok(());
        }
        let top = self.top_role_id().await?;
        let before = change.associations.remove.len();
        change.associations.remove.retain(|id| *id != top);
        if change.associations.remove.len() != before {
            debug!("Kept the '{}' role on update", self.top_role);
        }
        Ok(())
    }

    /// Delete a permission and its grants. Returns the title.
    pub async fn delete(&self, id: &PkValue) -> Result<String> {
        let deleted = self.entities.delete(id, Some(TITLE)).await?;
        info!("Deleted permission {}", id);
        deleted
            .and_then(|value| value.as_str().map(str::to_string))
            .ok_or_else(|| MapperError::DataModel(format!("permission {} had no title", id)))
    }
}
