//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{MapperError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let db = &config.database;
    if db.host.is_empty() {
        return Err(MapperError::Config("database.host is required".into()));
    }
    if db.port == 0 {
        return Err(MapperError::Config("database.port must be non-zero".into()));
    }
    if db.database.is_empty() {
        return Err(MapperError::Config("database.database is required".into()));
    }
    if db.user.is_empty() {
        return Err(MapperError::Config("database.user is required".into()));
    }
    validate_identifier(&db.schema)
        .map_err(|e| MapperError::Config(format!("database.schema: {}", e)))?;

    let mapper = &config.mapper;
    if mapper.sequence_function.is_empty() {
        return Err(MapperError::Config(
            "mapper.sequence_function cannot be empty".into(),
        ));
    }
    if mapper.top_role.is_empty() {
        return Err(MapperError::Config("mapper.top_role cannot be empty".into()));
    }
    if let Some(0) = mapper.list_limit {
        return Err(MapperError::Config(
            "mapper.list_limit must be at least 1".into(),
        ));
    }

    Ok(())
}
