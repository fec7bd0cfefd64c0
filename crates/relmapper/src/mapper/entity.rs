//! Composite entities, change sets, and join-row grouping.

use std::collections::HashMap;

use serde::Serialize;

use crate::core::value::{PkValue, Record};
use crate::error::{MapperError, Result};

/// A primary row plus its non-empty, ordered association rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    fields: Record,
    associations: Vec<Record>,
}

impl Entity {
    /// Fails with `DataModel` when `associations` is empty.
    pub fn new(fields: Record, associations: Vec<Record>) -> Result<Self> {
        if associations.is_empty() {
            return Err(MapperError::DataModel(
                "an entity needs at least one association".into(),
            ));
        }
        Ok(Self {
            fields,
            associations,
        })
    }

    pub fn fields(&self) -> &Record {
        &self.fields
    }

    pub fn associations(&self) -> &[Record] {
        &self.associations
    }

    /// Keys of the associations, read from `column`, in order.
    pub fn association_ids(&self, column: &str) -> Vec<PkValue> {
        self.associations
            .iter()
            .filter_map(|a| a.get(column).and_then(PkValue::from_value))
            .collect()
    }

    pub fn into_parts(self) -> (Record, Vec<Record>) {
        (self.fields, self.associations)
    }
}

/// Association ids to add and remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssociationChange {
    pub add: Vec<PkValue>,
    pub remove: Vec<PkValue>,
}

impl AssociationChange {
    /// Difference between stored and submitted id lists, keeping list order.
    pub fn between(stored: &[PkValue], submitted: &[PkValue]) -> Self {
        let mut add: Vec<PkValue> = Vec::new();
        for id in submitted {
            if !stored.contains(id) && !add.contains(id) {
                add.push(id.clone());
            }
        }
        let remove = stored
            .iter()
            .filter(|id| !submitted.contains(id))
            .cloned()
            .collect();
        Self { add, remove }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Primary-row column changes plus association changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub columns: Record,
    pub associations: AssociationChange,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.associations.is_empty()
    }
}

/// Group a flat join recordset into entities.
///
/// Each row holds the primary columns plus association columns whose names
/// start with `prefix`; the prefix is stripped on the association side. Rows
/// for one entity are expected to be contiguous (the join is ordered by the
/// primary sort key), but grouping is keyed on the primary key so the result
/// is correct either way. Entity order is first appearance.
pub fn group_join_rows(rows: Vec<Record>, primary_key: &str, prefix: &str) -> Result<Vec<Entity>> {
    let mut index: HashMap<PkValue, usize> = HashMap::new();
    let mut groups: Vec<(Record, Vec<Record>)> = Vec::new();

    for row in rows {
        let mut fields = Record::new();
        let mut association = Record::new();
        for (column, value) in row {
            match column.strip_prefix(prefix).map(str::to_string) {
                Some(name) => association.insert(name, value),
                None => fields.insert(column, value),
            };
        }

        let key = fields
            .get(primary_key)
            .and_then(PkValue::from_value)
            .ok_or_else(|| {
                MapperError::DataModel(format!("join row has no '{}' key", primary_key))
            })?;

        match index.get(&key) {
            Some(&idx) => groups[idx].1.push(association),
            None => {
                index.insert(key, groups.len());
                groups.push((fields, vec![association]));
            }
        }
    }

    groups
        .into_iter()
        .map(|(fields, associations)| Entity::new(fields, associations))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlValue;

    fn row(id: i64, name: &str, role_id: i64, role: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("username", name)
            .with("roles__id", role_id)
            .with("roles__role", role)
    }

    #[test]
    fn test_entity_requires_an_association() {
        let err = Entity::new(Record::new(), vec![]).unwrap_err();
        assert!(matches!(err, MapperError::DataModel(_)));
    }

    #[test]
    fn test_entity_preserves_association_order() {
        let associations = vec![
            Record::new().with("id", 7i64),
            Record::new().with("id", 2i64),
            Record::new().with("id", 9i64),
        ];
        let entity = Entity::new(Record::new(), associations).unwrap();
        assert_eq!(
            entity.association_ids("id"),
            vec![PkValue::Int(7), PkValue::Int(2), PkValue::Int(9)]
        );
    }

    #[test]
    fn test_groups_contiguous_rows() {
        let rows = vec![
            row(1, "alice", 1, "A"),
            row(1, "alice", 2, "B"),
            row(2, "bob", 3, "C"),
        ];
        let entities = group_join_rows(rows, "id", "roles__").unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].associations().len(), 2);
        assert_eq!(entities[1].associations().len(), 1);
        assert_eq!(entities[0].fields().get_str("username"), Some("alice"));
        assert_eq!(entities[0].associations()[1].get_str("role"), Some("B"));
        assert!(!entities[0].fields().contains_key("roles__id"));
    }

    #[test]
    fn test_grouping_tolerates_interleaved_rows() {
        let rows = vec![
            row(1, "alice", 1, "A"),
            row(2, "bob", 3, "C"),
            row(1, "alice", 2, "B"),
        ];
        let entities = group_join_rows(rows, "id", "roles__").unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].association_ids("id"), vec![PkValue::Int(1), PkValue::Int(2)]);
    }

    #[test]
    fn test_grouping_keeps_distinct_text_keys_apart() {
        let rows = vec![
            Record::new().with("code", "7").with("roles__id", 1i64),
            Record::new().with("code", "007").with("roles__id", 2i64),
        ];
        let entities = group_join_rows(rows, "code", "roles__").unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].fields().get_str("code"), Some("7"));
        assert_eq!(entities[1].fields().get_str("code"), Some("007"));
        assert_eq!(entities[1].association_ids("id"), vec![PkValue::Int(2)]);
    }

    #[test]
    fn test_grouping_requires_primary_key() {
        let rows = vec![Record::new().with("id", SqlValue::Null).with("roles__id", 1i64)];
        assert!(group_join_rows(rows, "id", "roles__").is_err());
    }

    #[test]
    fn test_association_change_between() {
        let stored = vec![PkValue::Int(2), PkValue::Int(7)];
        let submitted = vec![PkValue::Int(7), PkValue::Int(9), PkValue::Int(9)];
        let change = AssociationChange::between(&stored, &submitted);
        assert_eq!(change.add, vec![PkValue::Int(9)]);
        assert_eq!(change.remove, vec![PkValue::Int(2)]);
        assert!(AssociationChange::between(&stored, &stored).is_empty());
    }

    #[test]
    fn test_change_set_is_empty() {
        assert!(ChangeSet::default().is_empty());
        let change = ChangeSet {
            columns: Record::new().with("name", "Bob"),
            ..Default::default()
        };
        assert!(!change.is_empty());
    }
}
