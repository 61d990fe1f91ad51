//! SeaORM entities of the sample library domain
//!
//! Authors and books carry the full audit column set and support soft
//! delete; publishers only record their creation date and use an integer key.

pub mod prelude;

pub mod author;
pub mod book;
pub mod publisher;

use crate::errors::RepositoryResult;
use crate::repository::EntityMetadata;

/// Mapping metadata for every sample entity
pub fn metadata() -> RepositoryResult<EntityMetadata> {
    Ok(EntityMetadata::builder()
        .register::<author::Entity>()?
        .register::<book::Entity>()?
        .register::<publisher::Entity>()?
        .build())
}
