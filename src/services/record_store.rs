use crate::entities::{items, prelude::*};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

/// Fields accepted when creating a record
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub name: String,
    pub description: Option<String>,
    pub cover: Option<String>,
    pub visible_to: Vec<String>,
    pub assigned_to: Vec<String>,
}

/// Result of a versioned reference list write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Applied,
    /// The record changed (or vanished) since the snapshot was read.
    Conflict,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<items::Model>>;

    /// Replaces the whole reference list if the record is still at `expected_version`.
    async fn replace_photos(
        &self,
        id: &str,
        photos: Vec<String>,
        expected_version: i64,
    ) -> Result<WriteStatus>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<items::Model>>;

    async fn create(&self, item: NewItem) -> Result<String>;

    async fn delete(&self, id: &str) -> Result<()>;
}

pub struct SeaOrmRecordStore {
    db: DatabaseConnection,
}

impl SeaOrmRecordStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for SeaOrmRecordStore {
    async fn find(&self, id: &str) -> Result<Option<items::Model>> {
        Ok(Items::find_by_id(id).one(&self.db).await?)
    }

    async fn replace_photos(
        &self,
        id: &str,
        photos: Vec<String>,
        expected_version: i64,
    ) -> Result<WriteStatus> {
        let res = Items::update_many()
            .col_expr(items::Column::Photos, Expr::value(items::StringList(photos)))
            .col_expr(items::Column::Version, Expr::value(expected_version + 1))
            .filter(items::Column::Id.eq(id))
            .filter(items::Column::Version.eq(expected_version))
            .exec(&self.db)
            .await?;

        if res.rows_affected == 1 {
            Ok(WriteStatus::Applied)
        } else {
            Ok(WriteStatus::Conflict)
        }
    }

    async fn list(&self) -> Result<Vec<items::Model>> {
        Ok(Items::find()
            .order_by_asc(items::Column::CreatedOn)
            .all(&self.db)
            .await?)
    }

    async fn create(&self, item: NewItem) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let model = items::ActiveModel {
            id: Set(id.clone()),
            name: Set(item.name),
            description: Set(item.description),
            cover: Set(item.cover),
            visible_to: Set(item.visible_to.into()),
            assigned_to: Set(item.assigned_to.into()),
            int_users: Set(items::StringList::default()),
            photos: Set(items::StringList::default()),
            created_on: Set(Utc::now()),
            version: Set(0),
        };
        model.insert(&self.db).await?;
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let res = Items::delete_by_id(id).exec(&self.db).await?;
        if res.rows_affected == 0 {
            tracing::debug!("Delete of unknown item {} was a no-op", id);
        }
        Ok(())
    }
}
