use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::repository::{Auditable, SoftDeletable};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "books")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub total_page: i32,
    pub creation_date: DateTimeUtc,
    pub modification_date: Option<DateTimeUtc>,
    pub deletion_date: Option<DateTimeUtc>,
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::author::Entity",
        from = "Column::AuthorId",
        to = "super::author::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Author,
}

impl Related<super::author::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn new(author_id: Uuid, title: impl Into<String>, total_page: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            title: title.into(),
            total_page,
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
