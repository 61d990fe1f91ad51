//! Unit of work and its factory
//!
//! A [`UnitOfWork`] exposes exactly one [`Repository`]. The
//! [`UnitOfWorkFactory`] is the single registration point for the layer: it
//! holds the connection pool and the mapping metadata and decides, per its
//! [`ServiceLifetime`], whether each unit of work gets a fresh repository or
//! shares one.

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::RepositoryConfig;
use crate::repository::{EntityMetadata, Repository};

/// How repositories are handed out
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceLifetime {
    /// A fresh repository, with its own staged changes, per unit of work
    #[default]
    Transient,
    /// One repository shared by every unit of work from the same factory;
    /// tracked snapshots live until `Repository::clear_tracking`
    Singleton,
}

/// Groups the work of one logical operation around a single repository
#[derive(Clone)]
pub struct UnitOfWork {
    repository: Arc<Repository>,
}

impl UnitOfWork {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Persist everything staged on the repository
    pub async fn complete(&self) -> crate::errors::RepositoryResult<usize> {
        self.repository.complete().await
    }

    /// Whether two units of work share the same repository
    pub fn shares_repository_with(&self, other: &UnitOfWork) -> bool {
        Arc::ptr_eq(&self.repository, &other.repository)
    }
}

/// Hands out units of work over one connection pool
pub struct UnitOfWorkFactory {
    connection: Arc<DatabaseConnection>,
    metadata: Arc<EntityMetadata>,
    lifetime: ServiceLifetime,
    shared: Option<Arc<Repository>>,
}

impl UnitOfWorkFactory {
    pub fn new(
        connection: Arc<DatabaseConnection>,
        metadata: EntityMetadata,
        lifetime: ServiceLifetime,
    ) -> Self {
        let metadata = Arc::new(metadata);
        let shared = match lifetime {
            ServiceLifetime::Singleton => Some(Arc::new(Repository::new(
                connection.clone(),
                metadata.clone(),
            ))),
            ServiceLifetime::Transient => None,
        };

        Self {
            connection,
            metadata,
            lifetime,
            shared,
        }
    }

    /// Factory with the default transient lifetime
    pub fn transient(connection: Arc<DatabaseConnection>, metadata: EntityMetadata) -> Self {
        Self::new(connection, metadata, ServiceLifetime::Transient)
    }

    /// Factory with the lifetime named in the repository configuration
    pub fn from_config(
        connection: Arc<DatabaseConnection>,
        metadata: EntityMetadata,
        config: &RepositoryConfig,
    ) -> Self {
        Self::new(connection, metadata, config.service_lifetime)
    }

    pub fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    /// A unit of work per the configured lifetime
    pub fn begin(&self) -> UnitOfWork {
        let repository = match &self.shared {
            Some(shared) => shared.clone(),
            None => Arc::new(Repository::new(
                self.connection.clone(),
                self.metadata.clone(),
            )),
        };
        debug!("Began {} unit of work", self.lifetime);
        UnitOfWork::new(repository)
    }
}
