//! Staged writes and identity snapshots
//!
//! Nothing touches the database until `complete()`: every write operation
//! renders its statement up front and parks it here as a [`StagedWrite`].
//! Tracked queries leave a snapshot of each materialized row behind so a
//! later `update` can write only the columns that actually changed.
//!
//! Snapshots only ever hold values read from the database. A staged write
//! carries the row it will produce instead, so dropping the write (discard or
//! rollback) leaves the snapshot accurate.

use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseTransaction, DbBackend, DbErr, EntityName,
    EntityTrait, IdenStatic, Iterable, ModelTrait, PrimaryKeyToColumn, QueryTrait, Statement,
    Value,
};
use std::collections::HashMap;
use tracing::trace;

use super::traits::{ChangeKind, IdentityKey};

/// A write statement waiting for `complete()`
#[derive(Debug)]
pub struct StagedWrite {
    table: String,
    kind: ChangeKind,
    identity: Option<IdentityKey>,
    statement: Statement,
    /// Row values once applied, `None` for deletes
    after: Option<Vec<Value>>,
}

impl StagedWrite {
    /// Insert with every column set
    pub fn insert<E: EntityTrait>(
        backend: DbBackend,
        model: &E::Model,
        identity: Option<IdentityKey>,
    ) -> Self {
        let active = active_model::<E>(model, |_| true);
        Self::new::<E>(ChangeKind::Added, identity, E::insert(active).build(backend))
            .producing::<E>(model)
    }

    /// Update writing every non-key column, `None` for key-only entities
    pub fn full_update<E: EntityTrait>(
        backend: DbBackend,
        kind: ChangeKind,
        model: &E::Model,
        identity: Option<IdentityKey>,
    ) -> Option<Self> {
        if E::Column::iter().all(is_key::<E>) {
            return None;
        }
        let active = active_model::<E>(model, |_| true);
        Some(Self::new::<E>(kind, identity, E::update(active).build(backend)).producing::<E>(model))
    }

    /// Update writing only the columns that differ from `before`, `None` if nothing differs
    pub fn diff_update<E: EntityTrait>(
        backend: DbBackend,
        model: &E::Model,
        before: &[Value],
        identity: Option<IdentityKey>,
    ) -> Option<Self> {
        let changed: Vec<String> = E::Column::iter()
            .zip(before)
            .filter(|(column, old)| !is_key::<E>(*column) && model.get(*column) != **old)
            .map(|(column, _)| column.as_str().to_string())
            .collect();

        if changed.is_empty() {
            return None;
        }

        let active = active_model::<E>(model, |column| {
            is_key::<E>(column) || changed.iter().any(|name| name == column.as_str())
        });
        Some(
            Self::new::<E>(
                ChangeKind::Modified,
                identity,
                E::update(active).build(backend),
            )
            .producing::<E>(model),
        )
    }

    pub fn delete<E: EntityTrait>(
        backend: DbBackend,
        model: &E::Model,
        identity: Option<IdentityKey>,
    ) -> Self {
        let active = active_model::<E>(model, is_key::<E>);
        Self::new::<E>(ChangeKind::Deleted, identity, E::delete(active).build(backend))
    }

    fn new<E: EntityTrait>(
        kind: ChangeKind,
        identity: Option<IdentityKey>,
        statement: Statement,
    ) -> Self {
        Self {
            table: E::default().table_name().to_string(),
            kind,
            identity,
            statement,
            after: None,
        }
    }

    fn producing<E: EntityTrait>(mut self, model: &E::Model) -> Self {
        self.after = Some(row_values::<E>(model));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn identity(&self) -> Option<&IdentityKey> {
        self.identity.as_ref()
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Column values the row holds once this write is applied
    pub fn after(&self) -> Option<&[Value]> {
        self.after.as_deref()
    }

    /// Execute inside the commit transaction.
    ///
    /// An update or delete that reaches no row means the row vanished (or
    /// never existed) since it was read, and fails the whole commit.
    pub async fn apply(self, txn: &DatabaseTransaction) -> Result<(), DbErr> {
        trace!("Applying {} on {}: {}", self.kind, self.table, self.statement);
        let result = txn.execute(self.statement).await?;

        if result.rows_affected() == 0 {
            match self.kind {
                ChangeKind::Added => {}
                ChangeKind::Modified | ChangeKind::Replaced => {
                    return Err(DbErr::RecordNotUpdated);
                }
                ChangeKind::Deleted => {
                    return Err(DbErr::RecordNotFound(format!(
                        "{} row to delete no longer exists",
                        self.table
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Pending writes plus the snapshots of tracked rows
#[derive(Debug, Default)]
pub struct ChangeTracker {
    pending: Vec<StagedWrite>,
    snapshots: HashMap<IdentityKey, Vec<Value>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, write: StagedWrite) {
        self.pending.push(write);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drain the pending writes in staging order
    pub fn take_pending(&mut self) -> Vec<StagedWrite> {
        std::mem::take(&mut self.pending)
    }

    /// Drop every pending write
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Record the current column values of a row under its identity
    pub fn remember<E: EntityTrait>(&mut self, identity: IdentityKey, model: &E::Model) {
        self.snapshots.insert(identity, row_values::<E>(model));
    }

    pub fn snapshot(&self, identity: &IdentityKey) -> Option<&[Value]> {
        self.snapshots.get(identity).map(Vec::as_slice)
    }

    /// Values an update of `identity` should be diffed against
    ///
    /// The row produced by the latest pending write for the identity wins over
    /// the snapshot, so successive updates in one batch stay consistent. A
    /// pending delete yields `None`.
    pub fn baseline(&self, identity: &IdentityKey) -> Option<&[Value]> {
        match self
            .pending
            .iter()
            .rev()
            .find(|write| write.identity() == Some(identity))
        {
            Some(write) => write.after(),
            None => self.snapshot(identity),
        }
    }

    pub fn forget(&mut self, identity: &IdentityKey) {
        self.snapshots.remove(identity);
    }

    /// Drop every snapshot, returning how many there were
    pub fn clear_snapshots(&mut self) -> usize {
        let dropped = self.snapshots.len();
        self.snapshots.clear();
        dropped
    }

    /// Number of rows currently snapshotted
    pub fn tracked(&self) -> usize {
        self.snapshots.len()
    }
}

/// Column values of a model in column declaration order
pub fn row_values<E: EntityTrait>(model: &E::Model) -> Vec<Value> {
    E::Column::iter().map(|column| model.get(column)).collect()
}

fn is_key<E: EntityTrait>(column: E::Column) -> bool {
    E::PrimaryKey::from_column(column).is_some()
}

fn active_model<E: EntityTrait>(
    model: &E::Model,
    include: impl Fn(E::Column) -> bool,
) -> E::ActiveModel {
    let mut active = <E::ActiveModel as ActiveModelTrait>::default();
    for column in E::Column::iter().filter(|c| include(*c)) {
        active.set(column, model.get(column));
    }
    active
}
