//! Error type definitions for the repository layer
//!
//! The hierarchy mirrors the layering of the crate: [`AppError`] for the
//! binary and configuration edge, [`RepositoryError`] for everything the
//! generic repository, the filter adapter and the metadata registry report.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors (SeaORM)
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Migration failures
    #[error("Migration failed: {message}")]
    Migration { message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Errors raised by SeaORM or the database driver, passed through untouched
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// The entity type was never registered in the mapping metadata
    #[error("Entity {entity} is not registered in the mapping metadata")]
    UnmappedEntity { entity: String },

    /// The entity declares no primary key at all
    #[error("Entity {entity} declares no primary key")]
    MissingPrimaryKey { entity: String },

    /// The entity declares a primary key spanning several columns
    #[error("Entity {entity} has a composite primary key ({columns} columns); a single-column key is required")]
    CompositeKey { entity: String, columns: usize },

    /// The key column type cannot be used for by-id lookups
    #[error("Entity {entity} key column {column} has unsupported type {column_type}")]
    UnsupportedKeyType {
        entity: String,
        column: String,
        column_type: String,
    },

    /// A supplied id could not be converted to the declared key type
    #[error("Cannot convert {value} to {expected} for {entity}.{column}")]
    KeyConversion {
        entity: String,
        column: String,
        expected: String,
        value: String,
    },

    /// Record not found
    #[error("Not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// Sort field outside the filter's allow-list or not a column of the entity
    #[error("Invalid sort field '{field}' (allowed: {allowed})")]
    InvalidSort { field: String, allowed: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a migration error
    pub fn migration<S: Into<String>>(message: S) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        Self::configuration(err.to_string())
    }
}

impl RepositoryError {
    /// Create an unmapped entity error
    pub fn unmapped<S: Into<String>>(entity: S) -> Self {
        Self::UnmappedEntity {
            entity: entity.into(),
        }
    }

    /// Create a not found error for a by-id operation
    pub fn not_found<E: Into<String>, I: Into<String>>(entity: E, id: I) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create an invalid sort error listing the permitted fields
    pub fn invalid_sort<S: Into<String>>(field: S, allowed: &[&str]) -> Self {
        Self::InvalidSort {
            field: field.into(),
            allowed: allowed.join(", "),
        }
    }

    /// Whether the error came straight from the mapper
    pub fn is_database(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
