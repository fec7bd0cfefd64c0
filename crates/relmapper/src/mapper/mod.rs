//! Mappers over introspected tables.
//!
//! [`TableMapper`] covers one table; [`MultiTableMapper`] composes a primary
//! table, a join table, and a target table into [`Entity`] reads and
//! transactional writes.

pub mod diff;
pub mod entity;
pub mod multi;
pub mod table;
pub mod transaction;

pub use entity::{group_join_rows, AssociationChange, ChangeSet, Entity};
pub use multi::MultiTableMapper;
pub use table::TableMapper;
