//! Specification objects
//!
//! A [`Specification`] bundles predicates, ordering, an eager load, paging and
//! a tracking override into one reusable value. [`SpecificationEvaluator`]
//! composes it onto a plain select or onto a repository [`Query`].

use sea_orm::sea_query::IntoCondition;
use sea_orm::{
    Condition, EntityTrait, Order, QueryFilter, QueryOrder, QuerySelect, Related, Select,
};

use crate::repository::query::{Include, Plain, Query};
use crate::repository::traits::Tracking;

/// Reusable query description for entity `E`, eager-loading through `L`
pub struct Specification<E: EntityTrait, L = Plain> {
    criteria: Vec<Condition>,
    ordering: Vec<(E::Column, Order)>,
    skip: Option<u64>,
    take: Option<u64>,
    tracking: Option<Tracking>,
    loader: L,
}

impl<E: EntityTrait> Default for Specification<E, Plain> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityTrait> Specification<E, Plain> {
    pub fn new() -> Self {
        Self {
            criteria: Vec::new(),
            ordering: Vec::new(),
            skip: None,
            take: None,
            tracking: None,
            loader: Plain,
        }
    }

    /// Eager-load the `R` relation of every matching row
    pub fn include<R>(self) -> Specification<E, Include<R>>
    where
        E: Related<R>,
        R: EntityTrait,
    {
        Specification {
            criteria: self.criteria,
            ordering: self.ordering,
            skip: self.skip,
            take: self.take,
            tracking: self.tracking,
            loader: Include::new(),
        }
    }
}

impl<E: EntityTrait, L> Specification<E, L> {
    pub fn filter<F: IntoCondition>(mut self, predicate: F) -> Self {
        self.criteria.push(predicate.into_condition());
        self
    }

    pub fn order_by(mut self, column: E::Column) -> Self {
        self.ordering.push((column, Order::Asc));
        self
    }

    pub fn order_by_desc(mut self, column: E::Column) -> Self {
        self.ordering.push((column, Order::Desc));
        self
    }

    pub fn skip(mut self, rows: u64) -> Self {
        self.skip = Some(rows);
        self
    }

    pub fn take(mut self, rows: u64) -> Self {
        self.take = Some(rows);
        self
    }

    pub fn as_no_tracking(mut self) -> Self {
        self.tracking = Some(Tracking::NoTracking);
        self
    }

    /// Tracking override, `None` keeps the query's own mode
    pub fn tracking(&self) -> Option<Tracking> {
        self.tracking
    }
}

/// Applies specifications to queries
pub struct SpecificationEvaluator;

impl SpecificationEvaluator {
    /// Compose criteria, ordering and paging onto a plain select.
    ///
    /// Eager loads are not part of a plain select; use [`evaluate`](Self::evaluate)
    /// for those.
    pub fn get_query<E: EntityTrait, L>(select: Select<E>, spec: &Specification<E, L>) -> Select<E> {
        let mut select = spec
            .criteria
            .iter()
            .cloned()
            .fold(select, |select, condition| select.filter(condition));

        for (column, order) in &spec.ordering {
            select = select.order_by(*column, order.clone());
        }
        if let Some(skip) = spec.skip {
            select = select.offset(skip);
        }
        if let Some(take) = spec.take {
            select = select.limit(take);
        }
        select
    }

    /// Compose a specification onto a repository query, eager loads included
    pub fn evaluate<'r, E: EntityTrait, L: Clone>(
        query: Query<'r, E, Plain>,
        spec: &Specification<E, L>,
    ) -> Query<'r, E, L> {
        let query = query.map_select(|select| Self::get_query(select, spec));
        let query = match spec.tracking {
            Some(tracking) => query.tracking(tracking),
            None => query,
        };
        query.with_loader(spec.loader.clone())
    }
}
