use std::collections::HashMap;
use std::path::PathBuf;

use super::sources::get_env_or_default;
use super::validation::validate_identifier;
use super::{ConfigError, ConfigSource, ConfigTrait};

pub const ENV_MIGRATIONS_DIR: &str = "KEEL_MIGRATIONS_DIR";
pub const ENV_LEDGER_SCHEMA: &str = "KEEL_LEDGER_SCHEMA";
pub const ENV_LEDGER_TABLE: &str = "KEEL_LEDGER_TABLE";

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
pub const DEFAULT_LEDGER_SCHEMA: &str = "public";
pub const DEFAULT_LEDGER_TABLE: &str = "schema_version";

/// Where migration files live and where the ledger is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationsConfig {
    /// Directory holding `V<timestamp>__<description>.sql` files
    pub dir: PathBuf,
    /// Schema that owns the ledger table
    pub ledger_schema: String,
    /// Ledger table name
    pub ledger_table: String,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            ledger_schema: DEFAULT_LEDGER_SCHEMA.to_string(),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

impl MigrationsConfig {
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Replace the directory when a command-line override was given
    pub fn override_dir(self, dir: Option<PathBuf>) -> Self {
        match dir {
            Some(dir) => self.with_dir(dir),
            None => self,
        }
    }

    pub fn with_ledger(mut self, schema: impl Into<String>, table: impl Into<String>) -> Self {
        self.ledger_schema = schema.into();
        self.ledger_table = table.into();
        self
    }
}

impl ConfigTrait for MigrationsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = MigrationsConfig {
            dir: PathBuf::from(get_env_or_default(
                ENV_MIGRATIONS_DIR,
                DEFAULT_MIGRATIONS_DIR,
            )),
            ledger_schema: get_env_or_default(ENV_LEDGER_SCHEMA, DEFAULT_LEDGER_SCHEMA),
            ledger_table: get_env_or_default(ENV_LEDGER_TABLE, DEFAULT_LEDGER_TABLE),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::validation_failed(
                "dir",
                "Migrations directory cannot be empty",
            ));
        }
        validate_identifier("ledger_schema", &self.ledger_schema)?;
        validate_identifier("ledger_table", &self.ledger_table)?;
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        let env_dir = PathBuf::from(get_env_or_default(
            ENV_MIGRATIONS_DIR,
            DEFAULT_MIGRATIONS_DIR,
        ));
        let dir_source = if self.dir != env_dir {
            ConfigSource::Programmatic
        } else {
            ConfigSource::resolve(ENV_MIGRATIONS_DIR, DEFAULT_MIGRATIONS_DIR)
        };
        sources.insert("dir".to_string(), dir_source);
        sources.insert(
            "ledger_schema".to_string(),
            ConfigSource::resolve(ENV_LEDGER_SCHEMA, DEFAULT_LEDGER_SCHEMA),
        );
        sources.insert(
            "ledger_table".to_string(),
            ConfigSource::resolve(ENV_LEDGER_TABLE, DEFAULT_LEDGER_TABLE),
        );
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_test_env() {
        env::remove_var(ENV_MIGRATIONS_DIR);
        env::remove_var(ENV_LEDGER_SCHEMA);
        env::remove_var(ENV_LEDGER_TABLE);
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clean_test_env();

        let config = MigrationsConfig::from_env().unwrap();
        assert_eq!(config, MigrationsConfig::default());
        assert!(config.config_sources()["dir"].is_default());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clean_test_env();
        env::set_var(ENV_MIGRATIONS_DIR, "db/migrations");
        env::set_var(ENV_LEDGER_SCHEMA, "ops");

        let config = MigrationsConfig::from_env().unwrap();
        assert_eq!(config.dir, PathBuf::from("db/migrations"));
        assert_eq!(config.ledger_schema, "ops");
        assert_eq!(config.ledger_table, DEFAULT_LEDGER_TABLE);

        assert!(config.config_sources()["dir"].is_env_var());

        let config = config.override_dir(Some(PathBuf::from("other")));
        assert_eq!(config.dir, PathBuf::from("other"));
        assert_eq!(config.config_sources()["dir"], ConfigSource::Programmatic);

        let unchanged = config.clone().override_dir(None);
        assert_eq!(unchanged, config);

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_rejects_unsafe_ledger_name() {
        clean_test_env();
        env::set_var(ENV_LEDGER_TABLE, "versions; drop table users");

        assert!(MigrationsConfig::from_env().is_err());

        clean_test_env();
    }
}
