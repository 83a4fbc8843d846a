//! Devis Repository

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions, Collection, Database};

use super::entity::Devis;
use crate::billing::{DevisStatus, StatusLifecycle};
use crate::shared::error::Result;

/// Devis persistence as seen by the devis and invoice use cases.
#[async_trait]
pub trait DevisStore: Send + Sync {
    async fn insert(&self, devis: &Devis) -> Result<()>;

    async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Devis>>;

    /// Only the caller's devis among `ids`
    async fn find_by_ids(&self, user_id: &str, ids: &[String]) -> Result<Vec<Devis>>;

    async fn update(&self, devis: &Devis) -> Result<()>;
}

pub struct DevisRepository {
    collection: Collection<Devis>,
}

impl DevisRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("devis"),
        }
    }

    pub async fn insert(&self, devis: &Devis) -> Result<()> {
        self.collection.insert_one(devis).await?;
        Ok(())
    }

    pub async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Devis>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id, "userId": user_id })
            .await?)
    }

    /// Newest first
    pub async fn find_all(&self, user_id: &str) -> Result<Vec<Devis>> {
        self.find_sorted(doc! { "userId": user_id }).await
    }

    pub async fn find_by_client(&self, user_id: &str, client_id: &str) -> Result<Vec<Devis>> {
        self.find_sorted(doc! { "userId": user_id, "clientId": client_id }).await
    }

    /// Only the caller's devis among `ids`; foreign or unknown ids are absent.
    pub async fn find_by_ids(&self, user_id: &str, ids: &[String]) -> Result<Vec<Devis>> {
        self.find_sorted(doc! { "userId": user_id, "_id": { "$in": ids } }).await
    }

    pub async fn find_by_status(&self, user_id: &str, status: DevisStatus) -> Result<Vec<Devis>> {
        self.find_sorted(doc! { "userId": user_id, "status": status.as_str() }).await
    }

    pub async fn count_by_client(&self, user_id: &str, client_id: &str) -> Result<u64> {
        Ok(self
            .collection
            .count_documents(doc! { "userId": user_id, "clientId": client_id })
            .await?)
    }

    pub async fn update(&self, devis: &Devis) -> Result<()> {
        self.collection
            .replace_one(doc! { "_id": &devis.id, "userId": &devis.user_id }, devis)
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

    async fn find_sorted(&self, filter: bson::Document) -> Result<Vec<Devis>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
        let cursor = self.collection.find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl DevisStore for DevisRepository {
    async fn insert(&self, devis: &Devis) -> Result<()> {
        DevisRepository::insert(self, devis).await
    }

    async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Devis>> {
        DevisRepository::find_by_id(self, user_id, id).await
    }

    async fn find_by_ids(&self, user_id: &str, ids: &[String]) -> Result<Vec<Devis>> {
        DevisRepository::find_by_ids(self, user_id, ids).await
    }

    async fn update(&self, devis: &Devis) -> Result<()> {
        DevisRepository::update(self, devis).await
    }
}
