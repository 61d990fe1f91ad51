//! Composable repository queries
//!
//! A [`Query`] moves through three states, and each state only offers the
//! operations that are legal at that point of the pipeline:
//!
//! 1. `Query<E, Plain>` accepts predicates, key lookups, filter objects and
//!    specifications.
//! 2. `include::<R>()` turns it into `Query<E, Include<R>>`, which eager-loads
//!    `R` for every root row and no longer accepts predicates.
//! 3. `project(f)` turns either state into a [`Projected`] query that can only
//!    be materialized.
//!
//! Projection therefore can never run before filtering.
//!
//! ```rust,ignore
//! let titles = repository
//!     .query::<author::Entity>(Tracking::NoTracking)
//!     .filter(author::Column::Surname.eq("Le Guin"))
//!     .include::<book::Entity>()
//!     .project(|(author, books)| (author.name, books.len()))
//!     .multiple()
//!     .await?;
//! ```

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, IntoCondition};
use sea_orm::{
    DatabaseConnection, DbErr, EntityTrait, LoaderTrait, PaginatorTrait, QueryFilter,
    QuerySelect, Related, RelationType, Select, Value,
};
use std::marker::PhantomData;
use tracing::debug;

use super::generic::Repository;
use super::traits::{Loader, Tracking};
use crate::errors::RepositoryResult;
use crate::filtering::FilterBase;
use crate::specification::{Specification, SpecificationEvaluator};

/// Root rows only
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

/// Root rows paired with their `R` relations
#[derive(Debug)]
pub struct Include<R>(PhantomData<fn() -> R>);

impl<R> Include<R> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R> Default for Include<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for Include<R> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<R> Copy for Include<R> {}

#[async_trait]
impl<E: EntityTrait> Loader<E> for Plain {
    type Output = E::Model;

    async fn load(
        &self,
        models: Vec<E::Model>,
        _db: &DatabaseConnection,
    ) -> Result<Vec<E::Model>, DbErr> {
        Ok(models)
    }
}

#[async_trait]
impl<E, R> Loader<E> for Include<R>
where
    E: EntityTrait + Related<R>,
    E::Model: Sync,
    R: EntityTrait,
    R::Model: Send + Sync,
{
    type Output = (E::Model, Vec<R::Model>);

    async fn load(
        &self,
        models: Vec<E::Model>,
        db: &DatabaseConnection,
    ) -> Result<Vec<Self::Output>, DbErr> {
        if models.is_empty() {
            return Ok(Vec::new());
        }

        let related: Vec<Vec<R::Model>> = match <E as Related<R>>::to().rel_type {
            RelationType::HasMany => models.load_many(R::default(), db).await?,
            RelationType::HasOne => models
                .load_one(R::default(), db)
                .await?
                .into_iter()
                .map(|one| one.into_iter().collect())
                .collect(),
        };

        Ok(models.into_iter().zip(related).collect())
    }
}

/// A query under construction against entity `E`
pub struct Query<'r, E: EntityTrait, L = Plain> {
    repository: &'r Repository,
    select: Select<E>,
    tracking: Tracking,
    loader: L,
}

impl<'r, E: EntityTrait> Query<'r, E, Plain> {
    pub(crate) fn new(repository: &'r Repository, tracking: Tracking) -> Self {
        Self {
            repository,
            select: E::find(),
            tracking,
            loader: Plain,
        }
    }

    /// Add a boolean predicate, AND-ed with any earlier one
    pub fn filter<F: IntoCondition>(mut self, predicate: F) -> Self {
        let condition = predicate.into_condition();
        if !condition.is_empty() {
            self.select = self.select.filter(condition);
        }
        self
    }

    /// Restrict to the row whose primary key equals `id`
    pub fn by_id(self, id: impl Into<Value>) -> RepositoryResult<Self> {
        let predicate = self.repository.metadata().key_predicate::<E>(id)?;
        Ok(self.filter(predicate))
    }

    /// Apply a filter object's criteria, sort and page
    pub fn apply_filter<F: FilterBase<E>>(mut self, filter: &F) -> RepositoryResult<Self> {
        self.select = filter.apply(self.select)?;
        Ok(self)
    }

    /// Apply a filter object's criteria only, ignoring sort and page
    pub fn apply_criteria<F: FilterBase<E>>(mut self, filter: &F) -> Self {
        self.select = filter.apply_criteria(self.select);
        self
    }

    /// Compose a specification, including its eager loads
    pub fn with_specification<L: Clone>(self, spec: &Specification<E, L>) -> Query<'r, E, L> {
        SpecificationEvaluator::evaluate(self, spec)
    }

    /// Eager-load the `R` relation of every root row
    pub fn include<R>(self) -> Query<'r, E, Include<R>>
    where
        E: Related<R>,
        R: EntityTrait,
    {
        self.with_loader(Include::new())
    }
}

impl<'r, E: EntityTrait, L> Query<'r, E, L> {
    pub fn tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = tracking;
        self
    }

    /// Shape every materialized row with `projection`
    pub fn project<F, P>(self, projection: F) -> Projected<'r, E, L, F>
    where
        L: Loader<E>,
        F: Fn(L::Output) -> P,
    {
        Projected {
            query: self,
            projection,
        }
    }

    /// The underlying select, for inspection
    pub fn as_select(&self) -> &Select<E> {
        &self.select
    }

    pub(crate) fn map_select(mut self, f: impl FnOnce(Select<E>) -> Select<E>) -> Self {
        self.select = f(self.select);
        self
    }

    pub(crate) fn with_loader<L2>(self, loader: L2) -> Query<'r, E, L2> {
        Query {
            repository: self.repository,
            select: self.select,
            tracking: self.tracking,
            loader,
        }
    }
}

impl<'r, E, L> Query<'r, E, L>
where
    E: EntityTrait,
    L: Loader<E>,
{
    /// Materialize every matching row
    pub async fn multiple(self) -> RepositoryResult<Vec<L::Output>> {
        let connection = self.repository.connection();
        let models = self.select.all(connection).await?;
        debug!("Query materialized {} row(s)", models.len());

        if self.tracking.is_tracked() {
            self.repository.track::<E>(&models);
        }
        Ok(self.loader.load(models, connection).await?)
    }

    /// First matching row, `None` when nothing matches
    pub async fn single(self) -> RepositoryResult<Option<L::Output>> {
        let connection = self.repository.connection();
        let Some(model) = self.select.one(connection).await? else {
            return Ok(None);
        };

        if self.tracking.is_tracked() {
            self.repository.track::<E>(std::slice::from_ref(&model));
        }
        Ok(self.loader.load(vec![model], connection).await?.pop())
    }

    /// Number of matching rows; paging is ignored
    pub async fn count(self) -> RepositoryResult<u64>
    where
        E::Model: Sync,
    {
        Ok(self.select.count(self.repository.connection()).await?)
    }

    /// Whether any row matches, without materializing one
    pub async fn any(self) -> RepositoryResult<bool> {
        let probe = self
            .select
            .select_only()
            .column_as(Expr::value(1), "probe")
            .into_tuple::<i32>()
            .one(self.repository.connection())
            .await?;
        Ok(probe.is_some())
    }
}

/// A query whose rows are shaped by a projection; only materializers remain
pub struct Projected<'r, E: EntityTrait, L, F> {
    query: Query<'r, E, L>,
    projection: F,
}

impl<'r, E, L, F, P> Projected<'r, E, L, F>
where
    E: EntityTrait,
    L: Loader<E>,
    F: Fn(L::Output) -> P,
{
    pub async fn multiple(self) -> RepositoryResult<Vec<P>> {
        let Self { query, projection } = self;
        let rows = query.multiple().await?;
        Ok(rows.into_iter().map(projection).collect())
    }

    pub async fn single(self) -> RepositoryResult<Option<P>> {
        let Self { query, projection } = self;
        Ok(query.single().await?.map(projection))
    }
}
