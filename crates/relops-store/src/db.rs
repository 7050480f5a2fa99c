//! Connection pool setup

use relops_common::config::DatabaseConfig;
use relops_common::{Error, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Establish the shared connection pool. Sized for the whole process:
/// detector, correlation workers and API handlers all draw from it.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let ssl_mode = parse_ssl_mode(&config.sslmode)?;

    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.dbname)
        .ssl_mode(ssl_mode);

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .max_lifetime(Duration::from_secs(30 * 60))
        .idle_timeout(Duration::from_secs(15 * 60))
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    // Verify connectivity before handing the pool out
    sqlx::query("SELECT 1").execute(&pool).await?;

    info!(
        "Connected to database {}@{}:{}/{}",
        config.user, config.host, config.port, config.dbname
    );
    Ok(pool)
}

fn parse_ssl_mode(raw: &str) -> Result<PgSslMode> {
    match raw {
        "disable" => Ok(PgSslMode::Disable),
        "allow" => Ok(PgSslMode::Allow),
        "prefer" => Ok(PgSslMode::Prefer),
        "require" => Ok(PgSslMode::Require),
        "verify-ca" => Ok(PgSslMode::VerifyCa),
        "verify-full" => Ok(PgSslMode::VerifyFull),
        other => Err(Error::Configuration(format!("invalid sslmode: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssl_modes_parse() {
        assert!(parse_ssl_mode("disable").is_ok());
        assert!(parse_ssl_mode("verify-full").is_ok());
        assert!(parse_ssl_mode("mystery").is_err());
    }
}
