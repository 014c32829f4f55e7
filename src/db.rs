use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::{config::Host, NoTls};
use crate::error::{AppError, Result};
use std::time::Duration;

/// Creates a new database connection pool.
///
/// # Arguments
///
/// * `database_url` - The URL of the PostgreSQL database.
///
/// # Returns
///
/// A `Result` containing the `Pool`.
pub fn create_pool(database_url: &str) -> Result<Pool> {
    let mut cfg = Config::new();
    let pg_config: tokio_postgres::Config = database_url.parse()?;

    match pg_config.get_hosts().first() {
        Some(Host::Tcp(hostname)) => cfg.host = Some(hostname.clone()),
        #[cfg(unix)]
        Some(Host::Unix(path)) => cfg.host = Some(path.to_string_lossy().into_owned()),
        None => {}
    }

    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }

    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }

    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }

    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.pool = Some(PoolConfig {
        max_size: 32,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(2)),
            recycle: Some(Duration::from_secs(1)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(AppError::from)
}

/// The schema applied at start-up. Every statement is idempotent.
const SCHEMA: &str = include_str!("../migrations/schema.sql");

/// Applies the schema to the database.
///
/// # Arguments
///
/// * `pool` - The database connection pool.
///
/// # Returns
///
/// A `Result<()>`.
pub async fn migrate(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    tracing::info!("✅ Database schema is up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_keeps_host_and_port_from_url() {
        // Building a pool does not open a connection.
        let pool = create_pool("postgres://u:p@db.example:6543/x").unwrap();
        assert_eq!(pool.status().max_size, 32);
        assert_eq!(pool.status().size, 0);
    }

    #[test]
    fn malformed_url_is_an_error() {
        assert!(create_pool("postgres://u:p@db.example:notaport/x").is_err());
    }
}
