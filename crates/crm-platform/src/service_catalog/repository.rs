//! Service Repository

use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions, Collection, Database};

use super::entity::Service;
use crate::shared::error::Result;

pub struct ServiceRepository {
    collection: Collection<Service>,
}

impl ServiceRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("services"),
        }
    }

    pub async fn insert(&self, service: &Service) -> Result<()> {
        self.collection.insert_one(service).await?;
        Ok(())
    }

    pub async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Service>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id, "userId": user_id })
            .await?)
    }

    /// Newest first
    pub async fn find_all(&self, user_id: &str) -> Result<Vec<Service>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
        let cursor = self
            .collection
            .find(doc! { "userId": user_id })
            .with_options(options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn update(&self, service: &Service) -> Result<()> {
        self.collection
            .replace_one(doc! { "_id": &service.id, "userId": &service.user_id }, service)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id, "userId": user_id })
            .await?;
        Ok(result.deleted_count > 0)
    }
}
