//! User Repository

use async_trait::async_trait;
use mongodb::{Collection, Database, bson::doc};
use futures::TryStreamExt;

use super::entity::{normalize_email, User};
use crate::shared::error::{is_duplicate_key_error, PlatformError, Result};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
}

pub struct UserRepository {
    collection: Collection<User>,
}

impl UserRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("users"),
        }
    }

    /// Insert a new user. A taken e-mail surfaces as a duplicate on `email`.
    pub async fn insert(&self, user: &User) -> Result<()> {
        match self.collection.insert_one(user).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key_error(&e) => Err(PlatformError::duplicate(
                "email",
                "Un compte existe déjà avec cet e-mail",
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.collection.find_one(doc! { "email": normalize_email(email) }).await?)
    }

    /// Ids of every account, for background scans
    pub async fn find_all_ids(&self) -> Result<Vec<String>> {
        let cursor = self.collection
            .clone_with_type::<bson::Document>()
            .find(doc! {})
            .projection(doc! { "_id": 1 })
            .await?;
        let docs: Vec<bson::Document> = cursor.try_collect().await?;
        Ok(docs
            .iter()
            .filter_map(|d| d.get_str("_id").ok().map(str::to_string))
            .collect())
    }

    pub async fn update(&self, user: &User) -> Result<()> {
        self.collection
            .replace_one(doc! { "_id": &user.id }, user)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        UserRepository::find_by_id(self, id).await
    }
}
