//! Entity capability traits and shared repository enums
//!
//! Entities opt into audit stamping by implementing [`Auditable`] on their
//! SeaORM `Model`. Both hooks default to no-ops, so an entity overrides only
//! the timestamps it actually stores:
//!
//! ```rust,ignore
//! impl Auditable for publisher::Model {
//!     fn stamp_created(&mut self, at: DateTime<Utc>) {
//!         self.creation_date = at;
//!     }
//! }
//! ```
//!
//! Soft delete is a separate, stricter capability: [`SoftDeletable`] has no
//! defaults and is required by the repository's soft delete operations at
//! compile time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use serde::{Deserialize, Serialize};
use std::any::TypeId;

/// Creation and modification timestamp hooks
pub trait Auditable {
    /// Called by `add`/`add_range` with the current UTC instant
    fn stamp_created(&mut self, _at: DateTime<Utc>) {}

    /// Called by `update`/`replace`/`soft_delete` with the current UTC instant
    fn stamp_modified(&mut self, _at: DateTime<Utc>) {}
}

/// Entities carrying a deleted flag and a deletion timestamp
pub trait SoftDeletable: Auditable {
    /// Set the deleted flag and the deletion timestamp
    fn mark_deleted(&mut self, at: DateTime<Utc>);

    fn is_deleted(&self) -> bool;
}

/// Whether materialized entities are snapshotted for change tracking
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tracking {
    /// Read-only results, nothing is remembered
    #[default]
    NoTracking,
    /// Results are snapshotted so later updates write only changed columns
    Tracked,
}

impl Tracking {
    pub fn is_tracked(self) -> bool {
        self == Self::Tracked
    }
}

/// Kind of a staged write
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Replaced,
    Deleted,
}

/// Identity of an entity instance inside one repository: entity type plus key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub entity: TypeId,
    pub key: String,
}

impl IdentityKey {
    pub fn of<E: EntityTrait>(key: &sea_orm::Value) -> Self {
        Self {
            entity: TypeId::of::<E>(),
            key: format!("{key:?}"),
        }
    }
}

/// Post-materialization step of a query: plain rows or rows with eager-loaded relations
#[async_trait]
pub trait Loader<E: EntityTrait>: Send + Sync {
    /// Row shape produced for each root entity
    type Output: Send;

    async fn load(
        &self,
        models: Vec<E::Model>,
        db: &DatabaseConnection,
    ) -> Result<Vec<Self::Output>, DbErr>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[derive(Default)]
    struct Plain {
        touched: bool,
    }

    impl Auditable for Plain {}

    #[test]
    fn test_default_hooks_leave_entity_untouched() {
        let mut plain = Plain::default();
        plain.stamp_created(Utc::now());
        plain.stamp_modified(Utc::now());
        assert!(!plain.touched);
    }

    #[test]
    fn test_tracking_parses_from_config_strings() {
        assert_eq!(Tracking::from_str("tracked").unwrap(), Tracking::Tracked);
        assert_eq!(Tracking::from_str("no_tracking").unwrap(), Tracking::NoTracking);
        assert_eq!(Tracking::default(), Tracking::NoTracking);
        assert!(Tracking::Tracked.is_tracked());
    }

    #[test]
    fn test_change_kind_display() {
        assert_eq!(ChangeKind::Replaced.to_string(), "replaced");
    }
}
