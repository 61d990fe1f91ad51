//! Centralized error handling for the repository layer
//!
//! Errors raised by the mapper (SeaORM) are carried unchanged inside
//! [`RepositoryError::Database`]; the only failures this crate produces on its
//! own are metadata lookups, primary key conversion, missing rows for by-id
//! operations and rejected sort fields.
//!
//! # Usage
//!
//! ```rust
//! use easy_repository::errors::{RepositoryError, RepositoryResult};
//!
//! fn lookup() -> RepositoryResult<()> {
//!     Err(RepositoryError::unmapped("authors"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;
