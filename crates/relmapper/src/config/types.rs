//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::tls::SslMode;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection.
    pub database: DatabaseConfig,

    /// Mapper behavior.
    #[serde(default)]
    pub mapper: MapperConfig,
}

/// PostgreSQL connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Schema holding the mapped tables (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: disable).
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Application name reported to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// Mapper behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Function name whose presence at the start of a column default marks
    /// the column as sequence-backed (default: "nextval").
    #[serde(default = "default_sequence_function")]
    pub sequence_function: String,

    /// Role name that is protected from removal and granted every permission
    /// (default: "owner").
    #[serde(default = "default_top_role")]
    pub top_role: String,

    /// Row cap applied to list views. Unlimited when unset.
    #[serde(default)]
    pub list_limit: Option<u32>,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            sequence_function: default_sequence_function(),
            top_role: default_top_role(),
            list_limit: None,
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_application_name() -> String {
    "relmapper".to_string()
}

fn default_sequence_function() -> String {
    "nextval".to_string()
}

fn default_top_role() -> String {
    "owner".to_string()
}
