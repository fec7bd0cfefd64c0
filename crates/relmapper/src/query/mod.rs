//! Parameterized SQL construction.
//!
//! Identifiers are quoted; values are always bound positionally.

pub mod builder;
pub mod insert;
pub mod select;
pub mod update;

pub use builder::QueryBuilder;
pub use insert::{InsertBuilder, InsertOutcome};
pub use select::SelectBuilder;
pub use update::UpdateBuilder;
