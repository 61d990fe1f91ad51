//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use easy_repository::{
    Repository, ServiceLifetime, UnitOfWorkFactory,
    config::DatabaseConfig,
    database::Database,
    entities,
};

/// Helper to create a migrated in-memory database
pub async fn create_test_database() -> Database {
    let database = Database::new(&DatabaseConfig::for_url("sqlite::memory:"))
        .await
        .expect("Failed to create test database");
    database.migrate().await.expect("Failed to run migrations");
    database
}

pub async fn create_test_repository() -> (Database, Repository) {
    let database = create_test_database().await;
    let metadata = entities::metadata().expect("Sample entities must register");
    let repository = Repository::new(database.connection(), Arc::new(metadata));
    (database, repository)
}

pub async fn create_test_factory(lifetime: ServiceLifetime) -> (Database, UnitOfWorkFactory) {
    let database = create_test_database().await;
    let metadata = entities::metadata().expect("Sample entities must register");
    let factory = UnitOfWorkFactory::new(database.connection(), metadata, lifetime);
    (database, factory)
}
