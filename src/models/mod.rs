//! Filter objects and specifications for the sample entities

pub mod filters;
pub mod specs;

pub use filters::{AuthorFilter, BookFilter};
pub use specs::{author_by_name, author_order_by_name};
