//! The generic repository
//!
//! One [`Repository`] serves every entity type. Write operations stage their
//! statements in memory and return immediately; [`Repository::complete`]
//! persists everything staged so far in a single transaction.

use chrono::Utc;
use sea_orm::sea_query::IntoCondition;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, EntityName, EntityTrait, ModelTrait, Select,
    TransactionTrait, Value,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::metadata::{EntityMetadata, render_key};
use super::query::Query;
use super::tracker::{ChangeTracker, StagedWrite};
use super::traits::{Auditable, ChangeKind, IdentityKey, SoftDeletable, Tracking};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::filtering::FilterBase;

/// Repository bound to one connection, owning its staged changes and snapshots
pub struct Repository {
    connection: Arc<DatabaseConnection>,
    metadata: Arc<EntityMetadata>,
    tracker: Mutex<ChangeTracker>,
}

impl Repository {
    /// Create a new repository instance
    pub fn new(connection: Arc<DatabaseConnection>, metadata: Arc<EntityMetadata>) -> Self {
        Self {
            connection,
            metadata,
            tracker: Mutex::new(ChangeTracker::new()),
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    /// Number of writes waiting for [`complete`](Self::complete)
    pub fn pending_changes(&self) -> usize {
        self.tracker().pending()
    }

    /// Number of rows snapshotted by tracked queries
    pub fn tracked_entities(&self) -> usize {
        self.tracker().tracked()
    }

    /// Stop tracking `model`; a later update writes every non-key column
    pub fn detach<M>(&self, model: &M) -> bool
    where
        M: ModelTrait,
        M::Entity: EntityTrait<Model = M>,
    {
        let Some(identity) = self.identity::<M::Entity>(model) else {
            return false;
        };
        let mut tracker = self.tracker();
        let tracked = tracker.snapshot(&identity).is_some();
        tracker.forget(&identity);
        tracked
    }

    /// Drop every snapshot left by tracked queries
    ///
    /// A repository shared by singleton units of work keeps snapshots for as
    /// long as it lives; call this once tracked reads are no longer needed.
    pub fn clear_tracking(&self) -> usize {
        let dropped = self.tracker().clear_snapshots();
        if dropped > 0 {
            debug!("Cleared {} tracked snapshot(s)", dropped);
        }
        dropped
    }

    /// Drop every staged write without touching the database
    pub fn discard_changes(&self) -> usize {
        let dropped = self.tracker().discard();
        if dropped > 0 {
            info!("Discarded {} staged change(s)", dropped);
        }
        dropped
    }

    // ---- Writes ----------------------------------------------------------

    /// Stage an insert of `model`
    ///
    /// The creation timestamp is set to the current UTC instant before the
    /// insert is rendered. The stamped model is returned.
    pub fn add<M>(&self, mut model: M) -> M
    where
        M: ModelTrait + Auditable,
        M::Entity: EntityTrait<Model = M>,
    {
        model.stamp_created(Utc::now());
        self.stage_insert::<M::Entity>(&model);
        model
    }

    /// Stage inserts for every model, all stamped with the same instant
    pub fn add_range<M>(&self, models: Vec<M>) -> Vec<M>
    where
        M: ModelTrait + Auditable,
        M::Entity: EntityTrait<Model = M>,
    {
        let now = Utc::now();
        models
            .into_iter()
            .map(|mut model| {
                model.stamp_created(now);
                self.stage_insert::<M::Entity>(&model);
                model
            })
            .collect()
    }

    /// Stage a change-tracked update of `model`
    ///
    /// The modification timestamp is set first. When a tracked query left a
    /// snapshot of this row, only the columns that differ from it are
    /// written (nothing at all if none differ); otherwise every non-key
    /// column is written. A write already staged for the same row counts
    /// as its current state. The snapshot itself is only ever replaced by
    /// another tracked read, so a discarded or rolled back update can be
    /// retried as is.
    pub fn update<M>(&self, model: M) -> M
    where
        M: ModelTrait + Auditable,
        M::Entity: EntityTrait<Model = M>,
    {
        self.stage_update::<M::Entity>(model, Utc::now(), ChangeKind::Modified)
    }

    pub fn update_range<M>(&self, models: Vec<M>) -> Vec<M>
    where
        M: ModelTrait + Auditable,
        M::Entity: EntityTrait<Model = M>,
    {
        let now = Utc::now();
        models
            .into_iter()
            .map(|model| self.stage_update::<M::Entity>(model, now, ChangeKind::Modified))
            .collect()
    }

    /// Stage a full-row update: every non-key column is written
    pub fn replace<M>(&self, model: M) -> M
    where
        M: ModelTrait + Auditable,
        M::Entity: EntityTrait<Model = M>,
    {
        self.stage_update::<M::Entity>(model, Utc::now(), ChangeKind::Replaced)
    }

    /// Stage removal of the row behind `model`
    pub fn hard_delete<M>(&self, model: &M)
    where
        M: ModelTrait,
        M::Entity: EntityTrait<Model = M>,
    {
        self.stage_delete::<M::Entity>(model);
    }

    /// Look up the row with primary key `id` and stage its removal
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Delete staged
    /// * `Err(RepositoryError::NotFound)` - No row has that key
    /// * `Err(RepositoryError::KeyConversion)` - `id` does not fit the key type
    pub async fn hard_delete_by_id<E: EntityTrait>(
        &self,
        id: impl Into<Value>,
    ) -> RepositoryResult<()> {
        let model = self.find_existing::<E>(id.into()).await?;
        self.stage_delete::<E>(&model);
        Ok(())
    }

    /// Mark `model` deleted, stamp its deletion time and stage a [`replace`](Self::replace)
    ///
    /// Soft-deleting an already deleted entity is allowed and refreshes the
    /// deletion time.
    pub fn soft_delete<M>(&self, model: M) -> M
    where
        M: ModelTrait + SoftDeletable,
        M::Entity: EntityTrait<Model = M>,
    {
        self.stage_soft_delete::<M::Entity>(model)
    }

    /// Look up the row with primary key `id` and soft-delete it
    pub async fn soft_delete_by_id<E>(&self, id: impl Into<Value>) -> RepositoryResult<E::Model>
    where
        E: EntityTrait,
        E::Model: SoftDeletable,
    {
        let model = self.find_existing::<E>(id.into()).await?;
        Ok(self.stage_soft_delete::<E>(model))
    }

    /// Persist every staged write in one transaction, in staging order
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - Number of writes applied; `0` without any database work when nothing was staged
    /// * `Err(RepositoryError::Database)` - The transaction was rolled back and the staged writes discarded
    pub async fn complete(&self) -> RepositoryResult<usize> {
        let pending = self.tracker().take_pending();
        if pending.is_empty() {
            debug!("No staged changes to persist");
            return Ok(0);
        }

        let count = pending.len();
        let written: Vec<IdentityKey> = pending
            .iter()
            .filter_map(|write| write.identity().cloned())
            .collect();

        let txn = self.connection.begin().await?;
        for write in pending {
            let (table, kind) = (write.table().to_string(), write.kind());
            if let Err(e) = write.apply(&txn).await {
                warn!("Staged {} on {} failed, rolling back: {}", kind, table, e);
                if let Err(rollback) = txn.rollback().await {
                    warn!("Rollback failed: {}", rollback);
                }
                return Err(e.into());
            }
        }
        txn.commit().await?;

        let mut tracker = self.tracker();
        for identity in &written {
            tracker.forget(identity);
        }
        drop(tracker);

        info!("Persisted {} staged change(s)", count);
        Ok(count)
    }

    // ---- Queries ---------------------------------------------------------

    /// The base select for `E`, without tracking or eager loading
    pub fn queryable<E: EntityTrait>(&self) -> Select<E> {
        E::find()
    }

    /// Start a composable query for `E`
    pub fn query<E: EntityTrait>(&self, tracking: Tracking) -> Query<'_, E> {
        Query::new(self, tracking)
    }

    pub async fn get_multiple<E, F>(
        &self,
        tracking: Tracking,
        predicate: F,
    ) -> RepositoryResult<Vec<E::Model>>
    where
        E: EntityTrait,
        F: IntoCondition,
    {
        self.query::<E>(tracking).filter(predicate).multiple().await
    }

    pub async fn get_single<E, F>(
        &self,
        tracking: Tracking,
        predicate: F,
    ) -> RepositoryResult<Option<E::Model>>
    where
        E: EntityTrait,
        F: IntoCondition,
    {
        self.query::<E>(tracking).filter(predicate).single().await
    }

    /// Find an entity by its primary key
    ///
    /// # Arguments
    ///
    /// * `tracking` - Whether the result is snapshotted for later updates
    /// * `id` - Key value in any form convertible to the declared key type
    ///
    /// # Returns
    ///
    /// * `Ok(Some(model))` - Entity found
    /// * `Ok(None)` - No row has that key
    /// * `Err(RepositoryError)` - Unregistered entity, unconvertible key or database error
    pub async fn get_by_id<E: EntityTrait>(
        &self,
        tracking: Tracking,
        id: impl Into<Value>,
    ) -> RepositoryResult<Option<E::Model>> {
        self.query::<E>(tracking).by_id(id)?.single().await
    }

    pub async fn get_multiple_filtered<E, F>(
        &self,
        tracking: Tracking,
        filter: &F,
    ) -> RepositoryResult<Vec<E::Model>>
    where
        E: EntityTrait,
        F: FilterBase<E>,
    {
        self.query::<E>(tracking)
            .apply_filter(filter)?
            .multiple()
            .await
    }

    pub async fn get_single_filtered<E, F>(
        &self,
        tracking: Tracking,
        filter: &F,
    ) -> RepositoryResult<Option<E::Model>>
    where
        E: EntityTrait,
        F: FilterBase<E>,
    {
        self.query::<E>(tracking).apply_filter(filter)?.single().await
    }

    pub async fn count<E, F>(&self, predicate: F) -> RepositoryResult<u64>
    where
        E: EntityTrait,
        E::Model: Sync,
        F: IntoCondition,
    {
        self.query::<E>(Tracking::NoTracking)
            .filter(predicate)
            .count()
            .await
    }

    /// Count rows matching the filter's criteria; its sort and page are ignored
    pub async fn count_filtered<E, F>(&self, filter: &F) -> RepositoryResult<u64>
    where
        E: EntityTrait,
        E::Model: Sync,
        F: FilterBase<E>,
    {
        self.query::<E>(Tracking::NoTracking)
            .apply_criteria(filter)
            .count()
            .await
    }

    pub async fn any<E, F>(&self, predicate: F) -> RepositoryResult<bool>
    where
        E: EntityTrait,
        F: IntoCondition,
    {
        self.query::<E>(Tracking::NoTracking)
            .filter(predicate)
            .any()
            .await
    }

    // ---- Internals -------------------------------------------------------

    fn tracker(&self) -> MutexGuard<'_, ChangeTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn backend(&self) -> DbBackend {
        self.connection.get_database_backend()
    }

    /// Identity of a model, `None` for entities outside the metadata registry
    fn identity<E: EntityTrait>(&self, model: &E::Model) -> Option<IdentityKey> {
        if !self.metadata.is_registered::<E>() {
            return None;
        }
        match self.metadata.identity_key::<E>(model) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Cannot derive identity: {}", e);
                None
            }
        }
    }

    /// Snapshot rows materialized by a tracked query
    pub(crate) fn track<E: EntityTrait>(&self, models: &[E::Model]) {
        if !self.metadata.is_registered::<E>() {
            debug!(
                "Entity {} is not registered; tracked results are not snapshotted",
                E::default().table_name()
            );
            return;
        }

        let mut tracker = self.tracker();
        for model in models {
            if let Some(identity) = self.identity::<E>(model) {
                tracker.remember::<E>(identity, model);
            }
        }
    }

    fn stage_insert<E: EntityTrait>(&self, model: &E::Model) {
        let write = StagedWrite::insert::<E>(self.backend(), model, self.identity::<E>(model));
        debug!("Staged insert into {}", write.table());
        self.tracker().stage(write);
    }

    fn stage_update<E>(
        &self,
        mut model: E::Model,
        now: chrono::DateTime<Utc>,
        kind: ChangeKind,
    ) -> E::Model
    where
        E: EntityTrait,
        E::Model: Auditable,
    {
        model.stamp_modified(now);

        let backend = self.backend();
        let identity = self.identity::<E>(&model);
        let mut tracker = self.tracker();

        let baseline = identity.as_ref().and_then(|id| tracker.baseline(id));
        let write = match (kind, baseline) {
            (ChangeKind::Modified, Some(before)) => {
                StagedWrite::diff_update::<E>(backend, &model, before, identity.clone())
            }
            _ => StagedWrite::full_update::<E>(backend, kind, &model, identity.clone()),
        };

        match write {
            Some(write) => {
                debug!("Staged {} of {}", kind, write.table());
                tracker.stage(write);
            }
            None => debug!(
                "Nothing to write for {} of {}",
                kind,
                E::default().table_name()
            ),
        }
        model
    }

    fn stage_delete<E: EntityTrait>(&self, model: &E::Model) {
        let write = StagedWrite::delete::<E>(self.backend(), model, self.identity::<E>(model));
        debug!("Staged delete from {}", write.table());
        self.tracker().stage(write);
    }

    fn stage_soft_delete<E>(&self, mut model: E::Model) -> E::Model
    where
        E: EntityTrait,
        E::Model: SoftDeletable,
    {
        if model.is_deleted() {
            warn!(
                "Soft-deleting an already deleted {} row; deletion time is refreshed",
                E::default().table_name()
            );
        }

        let now = Utc::now();
        model.mark_deleted(now);
        self.stage_update::<E>(model, now, ChangeKind::Replaced)
    }

    async fn find_existing<E: EntityTrait>(&self, id: Value) -> RepositoryResult<E::Model> {
        let shown = render_key(&id);
        self.query::<E>(Tracking::NoTracking)
            .by_id(id)?
            .single()
            .await?
            .ok_or_else(|| RepositoryError::not_found(E::default().table_name(), shown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::Database;
    use crate::entities::{self, author, publisher};
    use tracing_test::traced_test;

    async fn repository() -> Repository {
        let database = Database::new(&DatabaseConfig::for_url("sqlite::memory:"))
            .await
            .unwrap();
        database.migrate().await.unwrap();
        Repository::new(database.connection(), Arc::new(entities::metadata().unwrap()))
    }

    #[tokio::test]
    #[traced_test]
    async fn test_complete_without_changes_does_nothing() {
        let repository = repository().await;
        assert_eq!(repository.complete().await.unwrap(), 0);
        assert!(logs_contain("No staged changes to persist"));
    }

    #[tokio::test]
    async fn test_writes_are_staged_until_complete() {
        let repository = repository().await;
        let author = repository.add(author::Model::new("Iain", "Banks"));
        assert_eq!(repository.pending_changes(), 1);

        let before = repository
            .get_by_id::<author::Entity>(Tracking::NoTracking, author.id)
            .await
            .unwrap();
        assert!(before.is_none());

        assert_eq!(repository.complete().await.unwrap(), 1);
        assert_eq!(repository.pending_changes(), 0);
        assert!(
            repository
                .get_by_id::<author::Entity>(Tracking::NoTracking, author.id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_discard_changes() {
        let repository = repository().await;
        repository.add(publisher::Model::new(1, "Orbit"));
        assert_eq!(repository.discard_changes(), 1);
        assert_eq!(repository.complete().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tracked_update_without_changes_stages_only_the_timestamp() {
        let repository = repository().await;
        let author = repository.add(author::Model::new("Iain", "Banks"));
        repository.complete().await.unwrap();

        let loaded = repository
            .get_by_id::<author::Entity>(Tracking::Tracked, author.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(repository.tracked_entities(), 1);

        repository.update(loaded);
        assert_eq!(repository.pending_changes(), 1);
        repository.complete().await.unwrap();
        assert_eq!(repository.tracked_entities(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_double_soft_delete_warns() {
        let repository = repository().await;
        let author = repository.add(author::Model::new("Iain", "Banks"));
        repository.complete().await.unwrap();

        let deleted = repository.soft_delete(author);
        let first = deleted.deletion_date;
        let again = repository.soft_delete(deleted);

        assert!(again.deletion_date >= first);
        assert!(logs_contain("already deleted"));
        assert_eq!(repository.complete().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_commit_discards_staged_changes() {
        let repository = repository().await;
        let publisher = publisher::Model::new(9, "Tor");
        repository.add(publisher.clone());
        repository.add(publisher);

        let err = repository.complete().await.unwrap_err();
        assert!(err.is_database());
        assert_eq!(repository.pending_changes(), 0);
        assert_eq!(
            repository
                .count::<publisher::Entity, _>(sea_orm::Condition::all())
                .await
                .unwrap(),
            0
        );
    }
}
