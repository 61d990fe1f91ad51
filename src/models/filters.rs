//! Filter objects for authors and books
//!
//! Both deserialize from flat JSON or query-string style maps, e.g.
//! `{"page": 2, "per_page": 20, "sort_by": "surname", "name": "le gu"}`.

use chrono::{DateTime, Utc};
use sea_orm::Condition;
use serde::{Deserialize, Serialize};

use crate::entities::{author, book};
use crate::filtering::{FilterBase, PaginationFilter, Range, Sorting, contains_ignore_case};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorFilter {
    #[serde(flatten)]
    pub pagination: PaginationFilter,
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    /// Case-insensitive substring of the surname
    pub surname: Option<String>,
    pub creation_date: Range<DateTime<Utc>>,
    pub modification_date: Range<DateTime<Utc>>,
    pub deletion_date: Range<DateTime<Utc>>,
}

impl FilterBase<author::Entity> for AuthorFilter {
    const POSSIBLE_SORTINGS: &'static [&'static str] = &[
        "name",
        "surname",
        "creation_date",
        "modification_date",
        "deletion_date",
    ];
    const DEFAULT_SORT: Option<(&'static str, Sorting)> = Some(("name", Sorting::Descending));

    fn pagination(&self) -> &PaginationFilter {
        &self.pagination
    }

    fn criteria(&self) -> Condition {
        Condition::all()
            .add_option(
                self.name
                    .as_deref()
                    .map(|name| contains_ignore_case(author::Column::Name, name)),
            )
            .add_option(
                self.surname
                    .as_deref()
                    .map(|surname| contains_ignore_case(author::Column::Surname, surname)),
            )
            .add_option(self.creation_date.condition(author::Column::CreationDate))
            .add_option(self.modification_date.condition(author::Column::ModificationDate))
            .add_option(self.deletion_date.condition(author::Column::DeletionDate))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookFilter {
    #[serde(flatten)]
    pub pagination: PaginationFilter,
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    pub total_page: Range<i32>,
    pub creation_date: Range<DateTime<Utc>>,
    pub modification_date: Range<DateTime<Utc>>,
    pub deletion_date: Range<DateTime<Utc>>,
}

impl FilterBase<book::Entity> for BookFilter {
    const POSSIBLE_SORTINGS: &'static [&'static str] = &[
        "title",
        "creation_date",
        "modification_date",
        "deletion_date",
    ];
    const DEFAULT_SORT: Option<(&'static str, Sorting)> = Some(("title", Sorting::Descending));

    fn pagination(&self) -> &PaginationFilter {
        &self.pagination
    }

    fn criteria(&self) -> Condition {
        Condition::all()
            .add_option(
                self.title
                    .as_deref()
                    .map(|title| contains_ignore_case(book::Column::Title, title)),
            )
            .add_option(self.total_page.condition(book::Column::TotalPage))
            .add_option(self.creation_date.condition(book::Column::CreationDate))
            .add_option(self.modification_date.condition(book::Column::ModificationDate))
            .add_option(self.deletion_date.condition(book::Column::DeletionDate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, EntityTrait, QueryTrait, Value};

    #[test]
    fn test_author_filter_from_json() {
        let filter: AuthorFilter = serde_json::from_str(
            r#"{
                "page": 2,
                "per_page": 5,
                "sort": "ascending",
                "sort_by": "surname",
                "name": "ur",
                "creation_date": {"min": "2024-01-01T00:00:00Z"}
            }"#,
        )
        .unwrap();

        assert_eq!(filter.pagination.page, 2);
        assert_eq!(filter.pagination.per_page, 5);
        assert_eq!(filter.pagination.sort_by.as_deref(), Some("surname"));
        assert_eq!(filter.name.as_deref(), Some("ur"));
        assert!(filter.creation_date.min.is_some());
        assert!(filter.creation_date.max.is_none());
    }

    #[test]
    fn test_empty_criteria_add_no_where_clause() {
        let sql = AuthorFilter::default()
            .apply_criteria(author::Entity::find())
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(!sql.contains("WHERE"), "{sql}");
    }

    #[test]
    fn test_book_filter_combines_criteria() {
        let filter = BookFilter {
            title: Some("Dune".to_string()),
            total_page: Range::between(100, 500),
            ..BookFilter::default()
        };
        let statement = filter
            .apply_criteria(book::Entity::find())
            .build(DbBackend::Sqlite);

        let sql = statement.to_string();
        assert!(sql.contains("LIKE '%dune%'"), "{sql}");
        assert!(
            statement
                .sql
                .contains(r#""books"."total_page" >= ? AND "books"."total_page" <= ?"#),
            "{}",
            statement.sql
        );

        // Bounds stay parameters after the ESCAPE literal
        let values = statement.values.map(|values| values.0).unwrap_or_default();
        assert!(values.contains(&Value::Int(Some(100))), "{values:?}");
        assert!(values.contains(&Value::Int(Some(500))), "{values:?}");
    }
}
