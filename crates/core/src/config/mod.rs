//! Configuration for keel
//!
//! Every value the engine needs is loaded here, validated, and then handed to
//! the engine explicitly. Library code never reads the process environment on
//! its own; only the `from_env` constructors do.

pub mod connection;
pub mod migrations;
pub mod sources;
pub mod validation;

use std::collections::HashMap;

pub use connection::{CaCertificate, ConnectionConfig, TlsConfig};
pub use migrations::MigrationsConfig;
pub use sources::ConfigSource;
pub use validation::ConfigError;

/// Configuration trait implemented by every keel configuration section
pub trait ConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Full configuration for commands that talk to the database
#[derive(Debug, Clone)]
pub struct KeelConfig {
    pub connection: ConnectionConfig,
    pub migrations: MigrationsConfig,
}

impl KeelConfig {
    pub fn new(connection: ConnectionConfig, migrations: MigrationsConfig) -> Self {
        Self {
            connection,
            migrations,
        }
    }
}

impl ConfigTrait for KeelConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = KeelConfig {
            connection: ConnectionConfig::from_env()?,
            migrations: MigrationsConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;
        self.migrations.validate()?;
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("connection".to_string(), ConfigSource::Nested);
        sources.insert("migrations".to_string(), ConfigSource::Nested);
        sources
    }
}
