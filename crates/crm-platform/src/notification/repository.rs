//! Notification Repository

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::FindOptions,
    Collection, Database,
};

use super::entity::Notification;
use crate::shared::error::{is_duplicate_key_error, Result};

/// Inbox size returned by a listing
const LIST_LIMIT: i64 = 200;

/// Inbox persistence as seen by `NotificationService`.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Store an entry. `Ok(false)` when its dedup key was already used.
    async fn insert(&self, notification: &Notification) -> Result<bool>;
}

/// Entries of `user_id` still in the inbox
fn inbox_filter(user_id: &str) -> Document {
    doc! { "userId": user_id, "deletedAt": { "$exists": false } }
}

pub struct NotificationRepository {
    collection: Collection<Notification>,
}

impl NotificationRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("notifications"),
        }
    }

    /// Newest first
    pub async fn find_for_user(&self, user_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let mut filter = inbox_filter(user_id);
        if unread_only {
            filter.insert("read", false);
        }
        let options = FindOptions::builder()
            .sort(doc! { "date": -1 })
            .limit(LIST_LIMIT)
            .build();
        let cursor = self.collection.find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn count_unread(&self, user_id: &str) -> Result<u64> {
        let mut filter = inbox_filter(user_id);
        filter.insert("read", false);
        Ok(self.collection.count_documents(filter).await?)
    }

    pub async fn mark_read(&self, user_id: &str, id: &str) -> Result<bool> {
        let mut filter = inbox_filter(user_id);
        filter.insert("_id", id);
        let result = self
            .collection
            .update_one(filter, doc! { "$set": { "read": true } })
            .await?;
        Ok(result.matched_count > 0)
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let mut filter = inbox_filter(user_id);
        filter.insert("read", false);
        let result = self
            .collection
            .update_many(filter, doc! { "$set": { "read": true } })
            .await?;
        Ok(result.modified_count)
    }

    /// Remove an entry from the inbox. Entries without a dedup key are
    /// dropped; keyed ones are only hidden.
    pub async fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        let mut unkeyed = inbox_filter(user_id);
        unkeyed.insert("_id", id);
        unkeyed.insert("dedupKey", doc! { "$exists": false });
        if self.collection.delete_one(unkeyed).await?.deleted_count > 0 {
            return Ok(true);
        }

        let mut keyed = inbox_filter(user_id);
        keyed.insert("_id", id);
        let result = self
            .collection
            .update_one(keyed, doc! { "$set": { "deletedAt": bson::DateTime::from_chrono(Utc::now()) } })
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<bool> {
        match self.collection.insert_one(notification).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key_error(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
