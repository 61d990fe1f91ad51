//! Generic repository over SeaORM entities
//!
//! This module provides one repository type that works for every entity,
//! instead of a hand-written repository per table:
//! - CRUD with creation/modification stamping and soft delete
//! - primary key lookups through the mapping metadata registry
//! - composable queries (predicate, eager load, projection, filter objects)
//! - a stage-then-commit protocol completed by [`Repository::complete`]
//!
//! # Usage
//!
//! ```rust,ignore
//! use easy_repository::entities::{self, author};
//! use easy_repository::repository::{Repository, Tracking};
//!
//! let repository = Repository::new(database.connection(), Arc::new(entities::metadata()?));
//! let author = repository.add(author::Model::new("Ursula", "Le Guin"));
//! repository.complete().await?;
//!
//! let found = repository
//!     .get_by_id::<author::Entity>(Tracking::NoTracking, author.id)
//!     .await?;
//! ```

pub mod generic;
pub mod metadata;
pub mod query;
pub mod tracker;
pub mod traits;

pub use generic::Repository;
pub use metadata::{EntityMetadata, EntityMetadataBuilder, KeyDescriptor, KeyKind, KeyPredicate};
pub use query::{Include, Plain, Projected, Query};
pub use tracker::{ChangeTracker, StagedWrite};
pub use traits::*;
