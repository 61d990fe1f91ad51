pub use super::author::Entity as Authors;
pub use super::book::Entity as Books;
pub use super::publisher::Entity as Publishers;
