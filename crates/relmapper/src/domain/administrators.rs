//! Administrators and the roles they hold.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::MapperConfig;
use crate::core::connection::Connection;
use crate::core::value::{PkValue, Record, SqlValue};
use crate::domain::auth::{AuthContext, InstancePermissions};
use crate::domain::roles::{Role, ROLES};
use crate::domain::{
    find_role_id, require_pk, require_text, whitelist, FieldSpec, ListView, ID, ROLE, ROLE_ID,
};
use crate::error::{MapperError, Result};
use crate::filter::{self, FilterFields};
use crate::mapper::{ChangeSet, Entity, MultiTableMapper, TableMapper};

pub const ADMINISTRATORS: &str = "administrators";
pub const ADMINISTRATOR_ROLES: &str = "administrator_roles";
const ADMINISTRATOR_ID: &str = "administrator_id";
const USERNAME: &str = "username";

/// Fields an administrator list can be filtered on.
pub const FILTER_FIELDS: &[FieldSpec] = &[
    ("id", ADMINISTRATORS, ID),
    ("username", ADMINISTRATORS, USERNAME),
    ("name", ADMINISTRATORS, "name"),
    ("email", ADMINISTRATORS, "email"),
    ("active", ADMINISTRATORS, "active"),
    ("role", ROLES, ROLE),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Administrator {
    pub id: PkValue,
    pub username: String,
    /// Every column of the administrators row.
    pub fields: Record,
    pub roles: Vec<Role>,
    /// Set when the list was read on behalf of an [`AuthContext`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<InstancePermissions>,
}

impl Administrator {
    fn from_entity(entity: Entity) -> Result<Self> {
        let (fields, associations) = entity.into_parts();
        Ok(Self {
            id: require_pk(&fields, ID, ADMINISTRATORS)?,
            username: require_text(&fields, USERNAME, ADMINISTRATORS)?,
            roles: associations
                .iter()
                .map(Role::from_record)
                .collect::<Result<_>>()?,
            fields,
            permissions: None,
        })
    }

    pub fn role_ids(&self) -> Vec<PkValue> {
        self.roles.iter().map(|role| role.id.clone()).collect()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|role| role.role == name)
    }
}

pub struct AdministratorMapper {
    entities: MultiTableMapper,
    fields: FilterFields,
    top_role: String,
    list_limit: Option<u32>,
}

impl AdministratorMapper {
    pub async fn load(conn: Arc<dyn Connection>, schema: &str, config: &MapperConfig) -> Result<Self> {
        let administrators = TableMapper::load(Arc::clone(&conn), schema, ADMINISTRATORS, config).await?;
        let administrator_roles =
            TableMapper::load(Arc::clone(&conn), schema, ADMINISTRATOR_ROLES, config).await?;
        let roles = TableMapper::load(conn, schema, ROLES, config).await?;
        Self::new(administrators, administrator_roles, roles, config)
    }

    pub fn new(
        administrators: TableMapper,
        administrator_roles: TableMapper,
        roles: TableMapper,
        config: &MapperConfig,
    ) -> Result<Self> {
        let entities = MultiTableMapper::new(
            administrators,
            administrator_roles,
            roles,
            ADMINISTRATOR_ID,
            ROLE_ID,
        )?;
        let fields = whitelist(FILTER_FIELDS, &[entities.primary(), entities.target()])?;

        info!("Administrator mapper ready ({} filter fields)", fields.len());
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

    /// Administrators matching `filter`, each with all of its roles.
    ///
    /// With `auth`, every administrator is annotated with what that caller
    /// may do to it.
    pub async fn get_objects(
        &self,
        filter: &str,
        order_by: Option<&str>,
        auth: Option<&AuthContext>,
    ) -> Result<Vec<Administrator>> {
        let filter = filter::parse(filter, &self.fields)?;
        let entities = self
            .entities
            .get_entities(Some(&filter), order_by, self.list_limit)
            .await?;

        entities
            .into_iter()
            .map(|entity| {
                let mut administrator = Administrator::from_entity(entity)?;
                if let Some(auth) = auth {
                    administrator.permissions =
                        Some(auth.permissions_for(&administrator.id, &administrator.role_ids()));
                }
                Ok(administrator)
            })
            .collect()
    }

    pub async fn list_view(
        &self,
        filter: &str,
        order_by: Option<&str>,
        auth: Option<&AuthContext>,
    ) -> Result<ListView<Administrator>> {
        ListView::degrade(self.get_objects(filter, order_by, auth).await, ADMINISTRATORS)
    }

    pub async fn get(&self, id: &PkValue) -> Result<Administrator> {
        Administrator::from_entity(self.entities.get_entity(id).await?)
    }

    /// The auth context of a signed-in administrator.
    pub async fn auth_context(&self, id: &PkValue) -> Result<AuthContext> {
        let administrator = self.get(id).await?;
        let top_role_id = find_role_id(self.entities.target(), &self.top_role).await?;
        Ok(AuthContext::new(
            administrator.id.clone(),
            administrator.role_ids(),
            top_role_id,
        ))
    }

    pub async fn username_exists(&self, username: &str, except: Option<&PkValue>) -> Result<bool> {
        self.entities
            .primary()
            .record_exists_for_value(USERNAME, &SqlValue::from(username), except)
            .await
    }

    /// Insert an administrator holding `role_ids`. Returns the new id.
    pub async fn create(&self, values: Record, role_ids: &[PkValue]) -> Result<PkValue> {
        let id = self.entities.create(values, role_ids).await?;
        info!("Created administrator {}", id);
        Ok(id)
    }

    /// Changes between the stored administrator and submitted input.
    pub async fn change_set(&self, id: &PkValue, submitted: &Record, role_ids: &[PkValue]) -> Result<ChangeSet> {
        let stored = self.entities.get_entity(id).await?;
        Ok(self.entities.change_set(submitted, role_ids, &stored))
    }

    /// Apply submitted input. Returns `false` when nothing changed.
    pub async fn update(&self, id: &PkValue, submitted: &Record, role_ids: &[PkValue]) -> Result<bool> {
        let change = self.change_set(id, submitted, role_ids).await?;
        if change.is_empty() {
            return Ok(false);
        }
        self.do_update(id, &change).await?;
        Ok(true)
    }

    pub async fn do_update(&self, id: &PkValue, change: &ChangeSet) -> Result<()> {
        self.entities.do_update(id, change).await
    }

    /// Delete an administrator on behalf of `auth`. Returns the username.
    pub async fn delete(&self, id: &PkValue, auth: &AuthContext) -> Result<String> {
        if *id == auth.administrator_id {
            return Err(MapperError::Validation(
                "administrators cannot delete their own account".into(),
            ));
        }
        let target = self.get(id).await?;
        if !auth.permissions_for(id, &target.role_ids()).can_delete {
            return Err(MapperError::Validation(format!(
                "only holders of the '{}' role may delete {}",
                self.top_role, target.username
            )));
        }

        let deleted = self.entities.delete(id, Some(USERNAME)).await?;
        info!("Deleted administrator {}", id);
        Ok(deleted
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or(target.username))
    }
}
