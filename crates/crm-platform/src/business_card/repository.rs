//! Business Card Repository
//!
//! Cards are keyed by owner; `userId` carries a unique index.

use chrono::{DateTime, Utc};
use mongodb::{bson::doc, Collection, Database};

use super::entity::{BusinessCard, CardConfig};
use crate::shared::error::{is_duplicate_key_error, PlatformError, Result};

pub struct BusinessCardRepository {
    collection: Collection<BusinessCard>,
}

impl BusinessCardRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("business_cards"),
        }
    }

    /// A card already owned by the same user surfaces as a duplicate on `userId`.
    pub async fn insert(&self, card: &BusinessCard) -> Result<()> {
        self.collection.insert_one(card).await.map_err(|e| {
            if is_duplicate_key_error(&e) {
                PlatformError::duplicate("userId", "Une carte de visite existe déjà")
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    pub async fn find_by_user(&self, user_id: &str) -> Result<Option<BusinessCard>> {
        Ok(self.collection.find_one(doc! { "userId": user_id }).await?)
    }

    /// Replace image and config, leaving stats alone.
    pub async fn update_content(
        &self,
        user_id: &str,
        card_image: Option<&str>,
        config: &CardConfig,
    ) -> Result<bool> {
        let config = bson::to_bson(config)?;
        let result = self
            .collection
            .update_one(
                doc! { "userId": user_id },
                doc! { "$set": {
                    "cardImage": card_image,
                    "cardConfig": config,
                    "updatedAt": bson::DateTime::now(),
                } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    pub async fn update_config(&self, user_id: &str, config: &CardConfig) -> Result<bool> {
        let config = bson::to_bson(config)?;
        let result = self
            .collection
            .update_one(
                doc! { "userId": user_id },
                doc! { "$set": { "cardConfig": config, "updatedAt": bson::DateTime::now() } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    /// Count a scan. Returns false when the user has no card.
    pub async fn record_view(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "userId": user_id },
                doc! {
                    "$inc": { "stats.totalViews": 1_i64 },
                    "$set": { "stats.lastViewedAt": bson::DateTime::from_chrono(at) },
                },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    /// Count a lead form submission. Returns false when the user has no card.
    pub async fn record_form_submission(&self, user_id: &str) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "userId": user_id },
                doc! { "$inc": { "stats.formSubmissions": 1_i64 } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    pub async fn delete(&self, user_id: &str) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "userId": user_id }).await?;
        Ok(result.deleted_count > 0)
    }
}
