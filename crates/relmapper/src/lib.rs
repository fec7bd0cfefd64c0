//! # relmapper
//!
//! Schema-introspecting data mapper for PostgreSQL.
//!
//! Table mappers are built from live catalog metadata at startup and then
//! generate parameterized SQL on their own:
//!
//! - **Typed column descriptors** read from `pg_catalog` (defaults, enums,
//!   sequences, unique keys)
//! - **Safe query building** with every value bound positionally
//! - **Many-to-many entities** assembled from flat join rows, filterable on
//!   association columns without losing sibling rows
//! - **Transactional writes** of a primary row plus its join rows
//! - **Diff-based updates** shared by every entity type
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use relmapper::{AdministratorMapper, Config, PgConnection};
//!
//! #[tokio::main]
//! async fn main() -> relmapper::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let conn = Arc::new(PgConnection::connect(&config.database).await?);
//!     let administrators =
//!         AdministratorMapper::load(conn, &config.database.schema, &config.mapper).await?;
//!     let view = administrators.list_view("role:=:editor", None, None).await?;
//!     println!("{} administrators", view.items.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod query;
pub mod schema;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use crate::core::{Connection, PgConnection, PkValue, Record, SqlValue, SslMode};
pub use catalog::CatalogReader;
pub use config::{Config, DatabaseConfig, MapperConfig};
pub use domain::{
    Administrator, AdministratorMapper, AuthContext, InstancePermissions, ListView, Permission,
    PermissionMapper, Role, RoleMapper,
};
pub use error::{MapperError, Result};
pub use filter::{FilterExpression, FilterFields};
pub use mapper::{ChangeSet, Entity, MultiTableMapper, TableMapper};
pub use schema::{ColumnDescriptor, ColumnMetadata, TableDescriptor};
