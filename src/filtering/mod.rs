//! Declarative filter objects
//!
//! A filter object is plain, deserializable data: page, page size, sort field,
//! sort direction and any number of per-field criteria. Implementing
//! [`FilterBase`] tells the repository how the criteria map onto columns; the
//! provided methods handle sorting and paging.
//!
//! ```rust,ignore
//! #[derive(Deserialize, Default)]
//! #[serde(default)]
//! struct TagFilter {
//!     #[serde(flatten)]
//!     pagination: PaginationFilter,
//!     label: Option<String>,
//! }
//!
//! impl FilterBase<tag::Entity> for TagFilter {
//!     const POSSIBLE_SORTINGS: &'static [&'static str] = &["label"];
//!
//!     fn pagination(&self) -> &PaginationFilter {
//!         &self.pagination
//!     }
//!
//!     fn criteria(&self) -> Condition {
//!         Condition::all().add_option(
//!             self.label
//!                 .as_deref()
//!                 .map(|label| contains_ignore_case(tag::Column::Label, label)),
//!         )
//!     }
//! }
//! ```

use sea_orm::sea_query::{Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, IdenStatic, Iterable, Order, QueryFilter, QueryOrder,
    QuerySelect, Select, Value,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::defaults::{DEFAULT_PAGE, DEFAULT_PER_PAGE};
use crate::errors::{RepositoryError, RepositoryResult};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sorting {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

impl Sorting {
    pub fn order(self) -> Order {
        match self {
            Self::Ascending => Order::Asc,
            Self::Descending => Order::Desc,
        }
    }
}

/// Paging and sorting part of every filter object
///
/// Pages are 1-based. An unset sort field or direction falls back to the
/// filter's [`FilterBase::DEFAULT_SORT`].
///
/// `sort_by` names the field and `sort` the direction, read as "sort by
/// title, descending". Payloads that use `sort` for the field and `sort_by`
/// for the direction must swap the two keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationFilter {
    pub page: u64,
    pub per_page: u64,
    pub sort: Option<Sorting>,
    pub sort_by: Option<String>,
}

impl Default for PaginationFilter {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
            sort: None,
            sort_by: None,
        }
    }
}

impl PaginationFilter {
    pub fn page(page: u64, per_page: u64) -> Self {
        Self {
            page,
            per_page,
            ..Self::default()
        }
    }

    pub fn sorted_by<S: Into<String>>(mut self, field: S, sort: Sorting) -> Self {
        self.sort_by = Some(field.into());
        self.sort = Some(sort);
        self
    }

    /// Rows skipped before the requested page
    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1).saturating_mul(self.limit())
    }

    pub fn limit(&self) -> u64 {
        self.per_page.max(1)
    }

    pub fn paginate<E: EntityTrait>(&self, select: Select<E>) -> Select<E> {
        select.offset(self.offset()).limit(self.limit())
    }
}

/// Inclusive range criterion; an open end is `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Range<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T> Default for Range<T> {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
        }
    }
}

impl<T> Range<T>
where
    T: Clone + Into<Value>,
{
    pub fn between(min: T, max: T) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// `column >= min AND column <= max` skipping open ends, `None` when both are open
    pub fn condition<C: ColumnTrait>(&self, column: C) -> Option<Condition> {
        if self.is_empty() {
            return None;
        }
        Some(
            Condition::all()
                .add_option(self.min.clone().map(|min| column.gte(min)))
                .add_option(self.max.clone().map(|max| column.lte(max))),
        )
    }
}

/// Case-insensitive substring match: `LOWER(column) LIKE '%needle%'`
pub fn contains_ignore_case<C: ColumnTrait>(column: C, needle: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
    Expr::expr(Func::lower(Expr::col((column.entity_name(), column))))
        .like(LikeExpr::new(pattern).escape('\\'))
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A filter object the repository can apply to queries on `E`
pub trait FilterBase<E: EntityTrait> {
    /// Column names accepted as sort fields, compared case-insensitively
    const POSSIBLE_SORTINGS: &'static [&'static str];

    /// Sort used when the filter names none
    const DEFAULT_SORT: Option<(&'static str, Sorting)> = None;

    fn pagination(&self) -> &PaginationFilter;

    /// Conjunction of the per-field criteria that are set
    fn criteria(&self) -> Condition;

    /// Criteria, then sort, then paging
    fn apply(&self, select: Select<E>) -> RepositoryResult<Select<E>> {
        let select = self.apply_criteria(select);
        let select = self.apply_sort(select)?;
        Ok(self.pagination().paginate(select))
    }

    fn apply_criteria(&self, select: Select<E>) -> Select<E> {
        let criteria = self.criteria();
        if criteria.is_empty() {
            select
        } else {
            select.filter(criteria)
        }
    }

    fn apply_sort(&self, select: Select<E>) -> RepositoryResult<Select<E>> {
        let pagination = self.pagination();
        let (field, default_sort) = match (&pagination.sort_by, Self::DEFAULT_SORT) {
            (Some(field), _) => (field.as_str(), Sorting::Ascending),
            (None, Some((field, sort))) => (field, sort),
            (None, None) => return Ok(select),
        };
        let sort = pagination.sort.unwrap_or(default_sort);

        let allowed = Self::POSSIBLE_SORTINGS
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(field))
            .ok_or_else(|| RepositoryError::invalid_sort(field, Self::POSSIBLE_SORTINGS))?;

        let column = E::Column::iter()
            .find(|column| column.as_str() == *allowed)
            .ok_or_else(|| RepositoryError::invalid_sort(field, Self::POSSIBLE_SORTINGS))?;

        debug!("Sorting {} {}", allowed, sort);
        Ok(select.order_by(column, sort.order()))
    }
}
