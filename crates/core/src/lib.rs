//! # keel-core
//!
//! Shared foundation for the keel workspace: explicit configuration values for
//! the database connection and the migrations corpus, plus logging setup.
//!
//! Nothing in here performs I/O against the database. Configuration is loaded
//! and validated up front so that the engine crates receive plain values.

pub mod config;
pub mod logging;

pub use config::{
    CaCertificate, ConfigError, ConfigSource, ConfigTrait, ConnectionConfig, KeelConfig,
    MigrationsConfig, TlsConfig,
};
pub use logging::{init_logging, LogFormat, LoggingConfig};
