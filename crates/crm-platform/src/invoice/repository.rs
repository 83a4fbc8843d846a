//! Invoice Repository

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, UpdateOptions},
    Collection, Database,
};
use serde::{Deserialize, Serialize};

use super::entity::{invoice_number_prefix, parse_invoice_sequence, Invoice};
use crate::billing::{InvoiceStatus, StatusLifecycle};
use crate::shared::error::{is_duplicate_key_error, PlatformError, Result};

pub const DUPLICATE_NUMBER_MESSAGE: &str = "Ce numéro de facture existe déjà";

fn map_write_error(e: mongodb::error::Error) -> PlatformError {
    if is_duplicate_key_error(&e) {
        PlatformError::duplicate("invoiceNumber", DUPLICATE_NUMBER_MESSAGE)
    } else {
        e.into()
    }
}

/// Invoice persistence as seen by the invoice use cases.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// A taken invoice number surfaces as a duplicate on `invoiceNumber`.
    async fn insert(&self, invoice: &Invoice) -> Result<()>;

    async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Invoice>>;

    async fn update(&self, invoice: &Invoice) -> Result<()>;

    /// Draw the next generated sequence of `year`. Never hands out the
    /// same value twice.
    async fn next_sequence(&self, year: i32) -> Result<u64>;
}

/// Per-year numbering counter, keyed by the number prefix
#[derive(Debug, Serialize, Deserialize)]
struct InvoiceCounter {
    #[serde(rename = "_id")]
    id: String,
    seq: i64,
}

pub struct InvoiceRepository {
    collection: Collection<Invoice>,
    counters: Collection<InvoiceCounter>,
}

impl InvoiceRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("invoices"),
            counters: db.collection("invoice_counters"),
        }
    }

    /// A taken invoice number surfaces as a duplicate on `invoiceNumber`.
    pub async fn insert(&self, invoice: &Invoice) -> Result<()> {
        self.collection
            .insert_one(invoice)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    pub async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Invoice>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id, "userId": user_id })
            .await?)
    }

    /// Newest first
    pub async fn find_all(&self, user_id: &str) -> Result<Vec<Invoice>> {
        self.find_sorted(doc! { "userId": user_id }).await
    }

    pub async fn find_by_client(&self, user_id: &str, client_id: &str) -> Result<Vec<Invoice>> {
        self.find_sorted(doc! { "userId": user_id, "clientId": client_id }).await
    }

    pub async fn find_by_status(&self, user_id: &str, status: InvoiceStatus) -> Result<Vec<Invoice>> {
        self.find_sorted(doc! { "userId": user_id, "status": status.as_str() }).await
    }

    pub async fn count_by_client(&self, user_id: &str, client_id: &str) -> Result<u64> {
        Ok(self
            .collection
            .count_documents(doc! { "userId": user_id, "clientId": client_id })
            .await?)
    }

    /// Highest generated sequence of `year` already stored, across every account
    pub async fn max_sequence(&self, year: i32) -> Result<u64> {
        let pattern = bson::Regex {
            pattern: format!("^{}", regex::escape(&invoice_number_prefix(year))),
            options: String::new(),
        };
        let mut cursor = self
            .collection
            .clone_with_type::<bson::Document>()
            .find(doc! { "invoiceNumber": { "$regex": pattern } })
            .projection(doc! { "invoiceNumber": 1 })
            .await?;

        let mut max = 0;
        while let Some(document) = cursor.try_next().await? {
            if let Some(sequence) = document
                .get_str("invoiceNumber")
                .ok()
                .and_then(|number| parse_invoice_sequence(number, year))
            {
                max = max.max(sequence);
            }
        }
        Ok(max)
    }

    /// `$inc` on the year's counter. A missing counter is first seeded from
    /// the numbers already stored.
    pub async fn next_sequence(&self, year: i32) -> Result<u64> {
        let key = invoice_number_prefix(year);

        if self.counters.find_one(doc! { "_id": &key }).await?.is_none() {
            let floor = i64::try_from(self.max_sequence(year).await?).unwrap_or(i64::MAX);
            // $max keeps a counter another request seeded first
            match self
                .counters
                .update_one(doc! { "_id": &key }, doc! { "$max": { "seq": floor } })
                .with_options(UpdateOptions::builder().upsert(true).build())
                .await
            {
                Ok(_) => {}
                Err(e) if is_duplicate_key_error(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = self
            .counters
            .find_one_and_update(doc! { "_id": &key }, doc! { "$inc": { "seq": 1_i64 } })
            .with_options(options)
            .await?
            .ok_or_else(|| PlatformError::internal("Invoice counter missing after upsert"))?;

        u64::try_from(counter.seq)
            .map_err(|_| PlatformError::internal(format!("Invoice counter {} is negative", counter.id)))
    }

    pub async fn update(&self, invoice: &Invoice) -> Result<()> {
        self.collection
            .replace_one(doc! { "_id": &invoice.id, "userId": &invoice.user_id }, invoice)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id, "userId": user_id })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn find_sorted(&self, filter: bson::Document) -> Result<Vec<Invoice>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
        let cursor = self.collection.find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl InvoiceStore for InvoiceRepository {
    async fn insert(&self, invoice: &Invoice) -> Result<()> {
        InvoiceRepository::insert(self, invoice).await
    }

    async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Invoice>> {
        InvoiceRepository::find_by_id(self, user_id, id).await
    }

    async fn update(&self, invoice: &Invoice) -> Result<()> {
        InvoiceRepository::update(self, invoice).await
    }

    async fn next_sequence(&self, year: i32) -> Result<u64> {
        InvoiceRepository::next_sequence(self, year).await
    }
}
