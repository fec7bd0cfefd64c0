//! Many-to-many entity mapper.
//!
//! Composes a primary [`TableMapper`] with a join table and a target table
//! (e.g. administrators, administrator_roles, roles) and reads or writes
//! [`Entity`] values: one primary row plus its non-empty association list.

use tracing::debug;

use crate::core::connection::Connection;
use crate::core::value::{PkValue, Record, SqlValue};
use crate::error::{MapperError, Result};
use crate::filter::FilterExpression;
use crate::mapper::entity::{group_join_rows, AssociationChange, ChangeSet, Entity};
use crate::mapper::table::TableMapper;
use crate::mapper::transaction;
use crate::query::SelectBuilder;

pub struct MultiTableMapper {
    primary: TableMapper,
    join: TableMapper,
    target: TableMapper,
    /// Join-table column referencing the primary key.
    owner_column: String,
    /// Join-table column referencing the target key.
    target_column: String,
    prefix: String,
}

impl MultiTableMapper {
    /// Fails with a schema error when the primary or target table lacks a
    /// single-column primary key, or the join table lacks either column.
    pub fn new(
        primary: TableMapper,
        join: TableMapper,
        target: TableMapper,
        owner_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Result<Self> {
        let owner_column = owner_column.into();
        let target_column = target_column.into();

        for table in [&primary, &target] {
            if table.descriptor().primary_key().is_none() {
                return Err(MapperError::Schema(format!(
                    "'{}' needs a single-column primary key to take part in an entity",
                    table.name()
                )));
            }
        }
        for column in [&owner_column, &target_column] {
            if !join.descriptor().has_column(column) {
                return Err(MapperError::Schema(format!(
                    "join table '{}' has no column '{}'",
                    join.name(),
                    column
                )));
            }
        }

        let prefix = format!("{}__", target.name());
        Ok(Self {
            primary,
            join,
            target,
            owner_column,
            target_column,
            prefix,
        })
    }

    pub fn primary(&self) -> &TableMapper {
        &self.primary
    }

    pub fn join(&self) -> &TableMapper {
        &self.join
    }

    pub fn target(&self) -> &TableMapper {
        &self.target
    }

    fn conn(&self) -> &dyn Connection {
        self.primary.connection()
    }

    fn primary_key(&self) -> &str {
        self.primary.descriptor().primary_key().unwrap_or_default()
    }

    fn target_key(&self) -> &str {
        self.target.descriptor().primary_key().unwrap_or_default()
    }

    /// `primary JOIN join JOIN target`.
    fn join_source(&self) -> Result<String> {
        let primary = self.primary.descriptor();
        let join = self.join.descriptor();
        let target = self.target.descriptor();
        Ok(format!(
            "{} INNER JOIN {} ON {} = {} INNER JOIN {} ON {} = {}",
            primary.qualified_name()?,
            join.qualified_name()?,
            join.column_sql(&self.owner_column)?,
            primary.column_sql(self.primary_key())?,
            target.qualified_name()?,
            target.column_sql(self.target_key())?,
            join.column_sql(&self.target_column)?,
        ))
    }

    /// Primary columns under their own names, target columns under
    /// `<target>__<column>`.
    fn projection(&self) -> Result<String> {
        let mut columns = Vec::new();
        for column in self.primary.descriptor().column_names() {
            columns.push(self.primary.descriptor().select_sql(column, None)?);
        }
        for column in self.target.descriptor().column_names() {
            let alias = format!("{}{}", self.prefix, column);
            columns.push(self.target.descriptor().select_sql(column, Some(&alias))?);
        }
        Ok(columns.join(", "))
    }

    /// Whether a filter column refers to the join or target table.
    fn targets_association(&self, column_sql: &str) -> bool {
        [self.join.name(), self.target.name()].iter().any(|table| {
            column_sql.starts_with(&format!("\"{}\".", table))
                || column_sql.starts_with(&format!("{}.", table))
        })
    }

    /// Entities matching `filter`, ordered by `order_by` (or the primary
    /// table's default) and then by association key.
    ///
    /// Predicates on association columns are applied through
    /// `pk IN (SELECT pk FROM <joins> WHERE ...)`, so each matching entity
    /// still comes back with its complete association list. This returns the
    /// same rows as first querying the matching keys and then loading those
    /// entities, in one round trip; filtering the outer join directly would
    /// drop the non-matching associations. `limit` caps the
    /// number of entities, not join rows.
    pub async fn get_entities(
        &self,
        filter: Option<&FilterExpression>,
        order_by: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Entity>> {
        let source = self.join_source()?;
        let pk_sql = self.primary.descriptor().column_sql(self.primary_key())?;
        let order = format!(
            "{}, {}",
            order_by.unwrap_or(self.primary.descriptor().default_order_by()),
            self.target.descriptor().column_sql(self.target_key())?
        );

        let mut select = SelectBuilder::new(source.clone())
            .columns(self.projection()?)
            .order_by(Some(&order));

        if let Some(filter) = filter {
            let (association, primary) = filter.partition(|column| self.targets_association(column));
            select = select.filter(&primary);
            if !association.is_empty() {
                let matching = SelectBuilder::new(source)
                    .columns(pk_sql.clone())
                    .filter(&association);
                select = select.where_in_subquery(pk_sql, matching);
            }
        }

        let rows = select.build()?.execute(self.conn()).await?;
        let mut entities = group_join_rows(rows, self.primary_key(), &self.prefix)?;
        if let Some(limit) = limit {
            entities.truncate(limit as usize);
        }
        debug!("Loaded {} {} entities", entities.len(), self.primary.name());
        Ok(entities)
    }

    pub async fn get_entity(&self, pk: &PkValue) -> Result<Entity> {
        let pk_sql = self.primary.descriptor().column_sql(self.primary_key())?;
        let order = self.target.descriptor().column_sql(self.target_key())?;
        let rows = SelectBuilder::new(self.join_source()?)
            .columns(self.projection()?)
            .where_eq(pk_sql, pk.clone())
            .order_by(Some(&order))
            .build()?
            .execute(self.conn())
            .await?;

        group_join_rows(rows, self.primary_key(), &self.prefix)?
            .into_iter()
            .next()
            .ok_or_else(|| MapperError::NotFound(format!("{} {}", self.primary.name(), pk)))
    }

    /// Compute the change set between submitted input and a stored entity.
    pub fn change_set(&self, submitted: &Record, submitted_ids: &[PkValue], stored: &Entity) -> ChangeSet {
        let mut columns = self.primary.changed_columns(submitted, stored.fields());
        columns.remove(self.primary_key());
        ChangeSet {
            columns,
            associations: AssociationChange::between(
                &stored.association_ids(self.target_key()),
                submitted_ids,
            ),
        }
    }

    fn join_row(&self, owner: &PkValue, target: &PkValue) -> Record {
        Record::new()
            .with(self.owner_column.as_str(), SqlValue::from(owner.clone()))
            .with(self.target_column.as_str(), SqlValue::from(target.clone()))
    }

    /// Insert the primary row and one join row per association id, all or
    /// nothing. Returns the new primary key.
    pub async fn create(&self, values: Record, association_ids: &[PkValue]) -> Result<PkValue> {
        let ids = AssociationChange::between(&[], association_ids).add;
        if ids.is_empty() {
            return Err(MapperError::DataModel(format!(
                "a new {} row needs at least one {}",
                self.primary.name(),
                self.target.name()
            )));
        }

        let operation = format!("create {}", self.primary.name());
        transaction::run(self.conn(), &operation, async {
            let id = self.primary.insert(values).await?.into_id()?;
            for target_id in &ids {
                self.join.insert(self.join_row(&id, target_id)).await?;
            }
            Ok(id)
        })
        .await
    }

    /// Apply a precomputed change set in one transaction.
    ///
    /// Column changes are written verbatim; added ids get a join row each;
    /// every removed id must match an existing join row or the whole update
    /// is rolled back with `NotFound`. The update is also rolled back if it
    /// would leave the entity with no associations.
    pub async fn do_update(&self, pk: &PkValue, change: &ChangeSet) -> Result<()> {
        if change.is_empty() {
            debug!("No changes for {} {}", self.primary.name(), pk);
            return Ok(());
        }

        let operation = format!("update {} {}", self.primary.name(), pk);
        transaction::run(self.conn(), &operation, async {
            if !change.columns.is_empty() {
                self.primary
                    .update_by_primary_key(&change.columns, pk, false, None)
                    .await?;
            }

            for target_id in &change.associations.add {
                self.join.insert(self.join_row(pk, target_id)).await?;
            }

            for target_id in &change.associations.remove {
                let removed = self.join.delete_matching(&self.join_row(pk, target_id)).await?;
                if removed == 0 {
                    return Err(MapperError::NotFound(format!(
                        "{} {} has no {} {}",
                        self.primary.name(),
                        pk,
                        self.target.name(),
                        target_id
                    )));
                }
            }

            let owner = Record::new().with(self.owner_column.as_str(), SqlValue::from(pk.clone()));
            if self.join.count_matching(&owner).await? == 0 {
                return Err(MapperError::DataModel(format!(
                    "{} {} would be left without any {}",
                    self.primary.name(),
                    pk,
                    self.target.name()
                )));
            }
            Ok(())
        })
        .await
    }

    /// Delete the join rows, then the primary row, in one transaction.
    /// Optionally returns one column of the deleted primary row.
    pub async fn delete(&self, pk: &PkValue, returning: Option<&str>) -> Result<Option<SqlValue>> {
        let operation = format!("delete {} {}", self.primary.name(), pk);
        transaction::run(self.conn(), &operation, async {
            let owner = Record::new().with(self.owner_column.as_str(), SqlValue::from(pk.clone()));
            self.join.delete_matching(&owner).await?;
            self.primary.delete_by_primary_key(pk, returning).await
        })
        .await
    }
}
