//! Client Repository
//!
//! Every query is scoped to the owning user.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions, Collection, Database};

use super::entity::{Client, ClientStatus};
use crate::billing::StatusLifecycle;
use crate::shared::error::Result;

/// Client lookups needed by the billing use cases.
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Client>>;
}

pub struct ClientRepository {
    collection: Collection<Client>,
}

impl ClientRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("clients"),
        }
    }

    pub async fn insert(&self, client: &Client) -> Result<()> {
        self.collection.insert_one(client).await?;
        Ok(())
    }

    pub async fn insert_many(&self, clients: &[Client]) -> Result<usize> {
        if clients.is_empty() {
            return Ok(0);
        }
        let result = self.collection.insert_many(clients).await?;
        Ok(result.inserted_ids.len())
    }

    pub async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Client>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id, "userId": user_id })
            .await?)
    }

    /// Newest first
    pub async fn find_all(&self, user_id: &str) -> Result<Vec<Client>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
        let cursor = self
            .collection
            .find(doc! { "userId": user_id })
            .with_options(options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn find_by_status(&self, user_id: &str, status: ClientStatus) -> Result<Vec<Client>> {
        let cursor = self
            .collection
            .find(doc! { "userId": user_id, "status": status.as_str() })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn find_by_ids(&self, user_id: &str, ids: &[String]) -> Result<Vec<Client>> {
        let cursor = self
            .collection
            .find(doc! { "userId": user_id, "_id": { "$in": ids } })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn update(&self, client: &Client) -> Result<()> {
        self.collection
            .replace_one(doc! { "_id": &client.id, "userId": &client.user_id }, client)
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

#[async_trait]
impl ClientStore for ClientRepository {
    async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Client>> {
        ClientRepository::find_by_id(self, user_id, id).await
    }
}
