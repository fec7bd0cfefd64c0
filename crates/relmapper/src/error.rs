//! Error types for the mapper layer.

use thiserror::Error;

/// Main error type for catalog, query, and mapper operations.
#[derive(Error, Debug)]
pub enum MapperError {
    /// Catalog introspection produced invalid or incomplete metadata.
    ///
    /// Raised while constructing mappers (empty enum type, nullable boolean
    /// column, unknown table). Not recoverable at runtime.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A composite value violated a construction invariant.
    #[error("Data model error: {0}")]
    DataModel(String),

    /// A primary-key scoped operation matched zero rows.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A filter expression was malformed or used something outside the whitelist.
    #[error("Invalid filter on '{field}': {message}")]
    Filter { field: String, message: String },

    /// Submitted values were rejected before reaching the database.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A multi-statement write failed after BEGIN and was rolled back.
    #[error("Transaction '{operation}' rolled back: {source}")]
    Transaction {
        operation: String,
        #[source]
        source: Box<MapperError>,
    },

    /// Statement execution failed in the driver (constraint violation, syntax, I/O).
    #[error("Query failed: {0}")]
    QueryFailure(#[from] tokio_postgres::Error),

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MapperError {
    /// Create a Filter error scoped to one field.
    pub fn filter(field: impl Into<String>, message: impl Into<String>) -> Self {
        MapperError::Filter {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap an error raised inside a transaction.
    pub fn transaction(operation: impl Into<String>, source: MapperError) -> Self {
        MapperError::Transaction {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// The underlying error, looking through transaction wrapping.
    pub fn root(&self) -> &MapperError {
        match self {
            MapperError::Transaction { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the root cause is a zero-row primary-key match.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), MapperError::NotFound(_))
    }

    /// Whether the root cause is the driver rejecting a statement.
    pub fn is_query_failure(&self) -> bool {
        matches!(self.root(), MapperError::QueryFailure(_))
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self.root() {
            MapperError::Config(_) | MapperError::Yaml(_) | MapperError::Io(_) => 2,
            MapperError::Filter { .. } | MapperError::Validation(_) => 3,
            MapperError::NotFound(_) => 4,
            MapperError::Schema(_) | MapperError::DataModel(_) => 5,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for mapper operations.
pub type Result<T> = std::result::Result<T, MapperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_error_names_field() {
        let err = MapperError::filter("username", "unknown operator 'LIKEISH'");
        assert_eq!(
            err.to_string(),
            "Invalid filter on 'username': unknown operator 'LIKEISH'"
        );
    }

    #[test]
    fn test_root_sees_through_transaction() {
        let err = MapperError::transaction(
            "update administrator",
            MapperError::NotFound("administrator_roles row".into()),
        );
        assert!(err.is_not_found());
        assert!(!err.is_query_failure());
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let err = MapperError::transaction("create", MapperError::Validation("bad".into()));
        let detailed = err.format_detailed();
        assert!(detailed.contains("Transaction 'create' rolled back"));
        assert!(detailed.contains("Caused by:\n  1: Validation failed: bad"));
    }
}
