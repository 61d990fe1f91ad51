//! Reusable specifications for authors

use sea_orm::ColumnTrait;

use crate::entities::{author, book};
use crate::repository::Include;
use crate::specification::Specification;

/// Authors whose name equals `name`
pub fn author_by_name(name: &str) -> Specification<author::Entity> {
    Specification::new().filter(author::Column::Name.eq(name))
}

/// Authors whose name contains `name`, ordered by name, with their books
pub fn author_order_by_name(name: &str) -> Specification<author::Entity, Include<book::Entity>> {
    Specification::new()
        .include::<book::Entity>()
        .filter(author::Column::Name.contains(name))
        .order_by(author::Column::Name)
}
