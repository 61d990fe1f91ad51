use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::repository::{Auditable, SoftDeletable};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "authors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub surname: String,
    pub creation_date: DateTimeUtc,
    pub modification_date: Option<DateTimeUtc>,
    pub deletion_date: Option<DateTimeUtc>,
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::book::Entity")]
    Books,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Books.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A new author with a fresh key; timestamps are stamped by the repository
    pub fn new(name: impl Into<String>, surname: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            surname: surname.into(),
            creation_date: DateTime::<Utc>::default(),
            modification_date: None,
            deletion_date: None,
            is_deleted: false,
        }
    }
}

impl Auditable for Model {
    fn stamp_created(&mut self, at: DateTime<Utc>) {
        self.creation_date = at;
    }

    fn stamp_modified(&mut self, at: DateTime<Utc>) {
        self.modification_date = Some(at);
    }
}

impl SoftDeletable for Model {
    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.is_deleted = true;
        self.deletion_date = Some(at);
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
}
