//! SeaORM migrations for multi-database support
//!
//! Migrations work across SQLite, PostgreSQL and MySQL. Column types that the
//! backends disagree on (UUIDs, timestamps) are chosen per backend by the
//! helpers in each migration.

use sea_orm_migration::prelude::*;

pub mod m20250301_000001_sample_schema;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250301_000001_sample_schema::Migration)]
    }
}
