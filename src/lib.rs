//! easy-repository: a generic repository and unit of work over SeaORM
//!
//! - [`repository`] - the generic repository, its queries and the mapping metadata
//! - [`filtering`] - declarative filter objects
//! - [`specification`] - reusable query specifications
//! - [`unit_of_work`] - units of work and their factory
//! - [`entities`] / [`models`] - the sample library domain

pub mod config;
pub mod database;
pub mod entities;
pub mod errors;
pub mod filtering;
pub mod models;
pub mod repository;
pub mod specification;
pub mod unit_of_work;

pub use errors::{AppError, AppResult, RepositoryError, RepositoryResult};
pub use repository::{Repository, Tracking};
pub use unit_of_work::{ServiceLifetime, UnitOfWork, UnitOfWorkFactory};
