use std::env;

use super::validation::ConfigError;

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value loaded from environment variable
    EnvVar(String),
    /// Default value used
    Default(String),
    /// Value loaded from nested configuration
    Nested,
    /// Value provided on the command line or in code
    Programmatic,
}

impl ConfigSource {
    /// Resolve the source of a variable that falls back to `default`
    pub fn resolve(var: &str, default: &str) -> Self {
        if env::var(var).is_ok() {
            ConfigSource::EnvVar(var.to_string())
        } else {
            ConfigSource::Default(default.to_string())
        }
    }

    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }

    pub fn description(&self) -> String {
        match self {
            ConfigSource::EnvVar(var) => format!("Environment variable: {}", var),
            ConfigSource::Default(value) => format!("Default value: {}", value),
            ConfigSource::Nested => "Nested configuration".to_string(),
            ConfigSource::Programmatic => "Command line or code".to_string(),
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// Helper functions for environment variable handling.
// Empty values count as unset so `KEEL_DB_PASSWORD=` behaves like no password.

pub(crate) fn get_env_required(key: &str) -> Result<String, ConfigError> {
    get_env_optional(key).ok_or_else(|| ConfigError::MissingEnvVar {
        var: key.to_string(),
    })
}

pub(crate) fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn get_env_or_default(key: &str, default: &str) -> String {
    get_env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(crate) fn get_env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match get_env_optional(key) {
        None => Ok(default),
        Some(value) => parse_bool(key, &value),
    }
}

pub(crate) fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(
            field,
            value,
            "true/false, yes/no, on/off or 1/0",
        )),
    }
}
