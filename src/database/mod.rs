//! SeaORM-based database connection management
//!
//! This module provides database-agnostic access using SeaORM with support for:
//! - SQLite (file databases are created on first use)
//! - PostgreSQL
//! - MySQL

use sea_orm::{ConnectOptions, Database as SeaOrmDatabase, DatabaseBackend, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, AppResult};

pub mod migrations;

use migrations::Migrator;

/// Idle and lifetime limit for the single in-memory SQLite connection
const IN_MEMORY_CONNECTION_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Database connection manager with multi-database support
#[derive(Clone)]
pub struct Database {
    /// Shared connection pool handed to every repository
    pub connection: Arc<DatabaseConnection>,
    /// Database backend type, used when rendering statements
    pub backend: DatabaseBackend,
    pub database_type: DatabaseType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    SQLite,
    PostgreSQL,
    MySQL,
}

impl Database {
    /// Connect using the given configuration
    pub async fn new(config: &DatabaseConfig) -> AppResult<Self> {
        let database_type = Self::detect_database_type(&config.url)?;
        let backend = match database_type {
            DatabaseType::SQLite => DatabaseBackend::Sqlite,
            DatabaseType::PostgreSQL => DatabaseBackend::Postgres,
            DatabaseType::MySQL => DatabaseBackend::MySql,
        };

        info!("Connecting to {} database", database_type);

        let connection_url = match database_type {
            DatabaseType::SQLite => Self::ensure_sqlite_auto_creation(&config.url)?,
            _ => config.url.clone(),
        };

        let connect_options = Self::connect_options(config, connection_url);

        let connection = match SeaOrmDatabase::connect(connect_options).await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Database connection failed: {:?}", e);
                let mut source = e.source();
                let mut level = 0;
                while let Some(err) = source {
                    error!("  Level {}: {}", level, err);
                    source = err.source();
                    level += 1;
                }
                return Err(e.into());
            }
        };

        debug!("Database connection established successfully");

        Ok(Self {
            connection: Arc::new(connection),
            backend,
            database_type,
        })
    }

    fn connect_options(config: &DatabaseConfig, connection_url: String) -> ConnectOptions {
        let mut connect_options = ConnectOptions::new(connection_url);
        connect_options
            .max_connections(Self::max_connections(config))
            .min_connections(1)
            .connect_timeout(config.connect_timeout)
            .sqlx_logging(config.sqlx_logging)
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        if Self::is_in_memory(&config.url) {
            // Recycling the only connection would drop the database with it
            connect_options
                .idle_timeout(IN_MEMORY_CONNECTION_LIFETIME)
                .max_lifetime(IN_MEMORY_CONNECTION_LIFETIME);
        } else {
            connect_options.idle_timeout(config.idle_timeout);
        }
        connect_options
    }

    /// Every connection to `sqlite::memory:` opens a separate database, so the
    /// pool is pinned to a single connection there
    fn max_connections(config: &DatabaseConfig) -> u32 {
        if Self::is_in_memory(&config.url) {
            1
        } else {
            config
                .max_connections
                .unwrap_or(crate::config::defaults::DEFAULT_MAX_CONNECTIONS)
        }
    }

    fn is_in_memory(url: &str) -> bool {
        url.contains(":memory:")
    }

    /// Detect the database type from the URL
    fn detect_database_type(url: &str) -> AppResult<DatabaseType> {
        if url.starts_with("sqlite:") {
            Ok(DatabaseType::SQLite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(DatabaseType::PostgreSQL)
        } else if url.starts_with("mysql:") {
            Ok(DatabaseType::MySQL)
        } else {
            Err(AppError::configuration(format!(
                "Unsupported database URL format: {url}"
            )))
        }
    }

    /// Ensure SQLite URL includes auto-creation mode if needed
    fn ensure_sqlite_auto_creation(url: &str) -> AppResult<String> {
        if url.contains("mode=") || url.contains(":memory:") {
            debug!("SQLite URL needs no modification: {}", url);
            return Ok(url.to_string());
        }

        let file_path = if let Some(path) = url.strip_prefix("sqlite://") {
            path
        } else if let Some(path) = url.strip_prefix("sqlite:") {
            path
        } else {
            return Err(AppError::configuration(format!(
                "Invalid SQLite URL format: {url}"
            )));
        };
        let file_path = file_path.split('?').next().unwrap_or(file_path);

        let path = std::path::Path::new(file_path);
        if path.exists() {
            debug!("SQLite database file already exists: {}", file_path);
            return Ok(url.to_string());
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::configuration(format!(
                        "Failed to create directory for SQLite database {}: {e}",
                        parent.display()
                    ))
                })?;
                info!("Created directory for SQLite database: {}", parent.display());
            }
        }

        let auto_create_url = if url.contains('?') {
            format!("{url}&mode=rwc")
        } else {
            format!("{url}?mode=rwc")
        };

        info!(
            "Modified SQLite URL to enable auto-creation: {} -> {}",
            url, auto_create_url
        );
        Ok(auto_create_url)
    }

    /// Apply all pending migrations
    pub async fn migrate(&self) -> AppResult<()> {
        info!("Running database migrations for {}", self.database_type);

        Migrator::up(&*self.connection, None)
            .await
            .map_err(|e| AppError::migration(e.to_string()))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Revert every applied migration
    pub async fn rollback(&self) -> AppResult<()> {
        info!("Reverting database migrations for {}", self.database_type);

        Migrator::down(&*self.connection, None)
            .await
            .map_err(|e| AppError::migration(e.to_string()))?;

        info!("Database migrations reverted");
        Ok(())
    }

    /// Get the shared database connection
    pub fn connection(&self) -> Arc<DatabaseConnection> {
        self.connection.clone()
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::SQLite => "SQLite",
            DatabaseType::PostgreSQL => "PostgreSQL",
            DatabaseType::MySQL => "MySQL",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("sqlite::memory:", DatabaseType::SQLite)]
    #[case("sqlite://./data/app.db", DatabaseType::SQLite)]
    #[case("postgres://localhost/app", DatabaseType::PostgreSQL)]
    #[case("postgresql://localhost/app", DatabaseType::PostgreSQL)]
    #[case("mysql://localhost/app", DatabaseType::MySQL)]
    fn test_detect_database_type(#[case] url: &str, #[case] expected: DatabaseType) {
        assert_eq!(Database::detect_database_type(url).unwrap(), expected);
    }

    #[test]
    fn test_unknown_scheme_is_a_configuration_error() {
        let err = Database::detect_database_type("oracle://db").unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_sqlite_file_urls_gain_create_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("app.db");
        let url = format!("sqlite://{}", file.display());

        let rewritten = Database::ensure_sqlite_auto_creation(&url).unwrap();
        assert_eq!(rewritten, format!("{url}?mode=rwc"));
        assert!(file.parent().unwrap().exists());

        assert_eq!(
            Database::ensure_sqlite_auto_creation("sqlite::memory:").unwrap(),
            "sqlite::memory:"
        );
    }

    #[test]
    fn test_memory_databases_use_one_connection() {
        assert_eq!(
            Database::max_connections(&DatabaseConfig::for_url("sqlite::memory:")),
            1
        );
        assert_eq!(
            Database::max_connections(&DatabaseConfig::for_url("sqlite://./app.db")),
            10
        );
    }

    #[test]
    fn test_memory_connection_is_never_recycled() {
        let config = DatabaseConfig::for_url("sqlite::memory:");
        let options = Database::connect_options(&config, config.url.clone());
        assert_eq!(options.get_idle_timeout(), Some(IN_MEMORY_CONNECTION_LIFETIME));
        assert_eq!(options.get_max_lifetime(), Some(IN_MEMORY_CONNECTION_LIFETIME));

        let config = DatabaseConfig::for_url("sqlite://./app.db");
        let options = Database::connect_options(&config, config.url.clone());
        assert_eq!(options.get_idle_timeout(), Some(config.idle_timeout));
        assert_eq!(options.get_max_lifetime(), None);
    }

    #[tokio::test]
    async fn test_migrate_and_rollback_in_memory() {
        let database = Database::new(&DatabaseConfig::for_url("sqlite::memory:"))
            .await
            .unwrap();
        database.migrate().await.unwrap();
        database.rollback().await.unwrap();
        database.migrate().await.unwrap();
    }
}
