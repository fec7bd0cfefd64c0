//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::error::Result;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl DatabaseConfig {
    /// Build a `tokio_postgres` connection config.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password)
            .application_name(&self.application_name);
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tls::SslMode;

    const MINIMAL: &str = r#"
database:
  host: db.internal
  database: admin
  user: app
  password: hunter2
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.schema, "public");
        assert_eq!(config.database.ssl_mode, SslMode::Disable);
        assert_eq!(config.mapper.sequence_function, "nextval");
        assert_eq!(config.mapper.top_role, "owner");
        assert_eq!(config.mapper.list_limit, None);
    }

    #[test]
    fn test_from_yaml_full() {
        let yaml = r#"
database:
  host: db.internal
  port: 6543
  database: admin
  user: app
  schema: backoffice
  ssl_mode: verify-full
mapper:
  top_role: superuser
  list_limit: 200
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.schema, "backoffice");
        assert_eq!(config.database.ssl_mode, SslMode::VerifyFull);
        assert_eq!(config.mapper.top_role, "superuser");
        assert_eq!(config.mapper.list_limit, Some(200));
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = "database:\n  host: ''\n  database: admin\n  user: app\n";
        assert!(Config::from_yaml(yaml).is_err());
        assert!(Config::from_yaml("database: [").is_err());
    }

    #[test]
    fn test_password_not_serialized() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("hunter2"), "Password was serialized: {}", yaml);
    }
}
