//! Database connection setup
//!
//! Turns an explicit [`ConnectionConfig`] into sqlx connect options. The engine
//! works over one connection for the whole invocation.

use keel_core::{CaCertificate, ConnectionConfig};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection, PgConnection};

use crate::error::{MigrateError, MigrateResult};

/// Build connect options from discrete parameters
pub fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.username)
        .application_name("keel")
        .ssl_mode(ssl_mode(config));

    if let Some(password) = &config.password {
        options = options.password(password);
    }

    match &config.tls.ca {
        Some(CaCertificate::Path(path)) if config.tls.enabled => {
            options = options.ssl_root_cert(path);
        }
        Some(CaCertificate::Inline(pem)) if config.tls.enabled => {
            options = options.ssl_root_cert_from_pem(pem.as_bytes().to_vec());
        }
        _ => {}
    }

    // Statement logging would echo whole migration bodies at info level
    options.disable_statement_logging()
}

fn ssl_mode(config: &ConnectionConfig) -> PgSslMode {
    match (config.tls.enabled, config.tls.verify) {
        (false, _) => PgSslMode::Disable,
        (true, false) => PgSslMode::Require,
        (true, true) => PgSslMode::VerifyFull,
    }
}

/// Open the single connection used by an invocation
pub async fn connect(config: &ConnectionConfig) -> MigrateResult<PgConnection> {
    tracing::debug!(target = %config.display_target(), "Connecting to database");
    PgConnection::connect_with(&connect_options(config))
        .await
        .map_err(|e| {
            MigrateError::database(format!("connect to {}", config.display_target()), e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::TlsConfig;

    #[test]
    fn test_ssl_mode_mapping() {
        let plain = ConnectionConfig::new("cards", "app");
        assert!(matches!(ssl_mode(&plain), PgSslMode::Disable));

        let unverified = plain.clone().with_tls(TlsConfig {
            enabled: true,
            verify: false,
            ca: None,
        });
        assert!(matches!(ssl_mode(&unverified), PgSslMode::Require));

        let verified = plain.with_tls(TlsConfig {
            enabled: true,
            verify: true,
            ca: None,
        });
        assert!(matches!(ssl_mode(&verified), PgSslMode::VerifyFull));
    }

    #[test]
    fn test_connect_options_carry_parameters() {
        let config = ConnectionConfig::new("cards", "app")
            .with_host("db.internal", 6543)
            .with_password("pw");
        let options = connect_options(&config);
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("cards"));
        assert_eq!(options.get_username(), "app");
    }
}
