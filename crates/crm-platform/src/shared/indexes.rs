//! MongoDB Index Initialization
//!
//! Creates indexes for all collections on application startup.

use mongodb::{Database, IndexModel, bson::{doc, Document}, options::IndexOptions};
use tracing::info;

/// Collections holding per-user data
const TENANT_COLLECTIONS: &[&str] = &[
    "clients",
    "devis",
    "invoices",
    "appointments",
    "services",
];

/// Initialize all MongoDB indexes
pub async fn initialize_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    info!("Initializing MongoDB indexes...");

    create_user_indexes(db).await?;
    create_tenant_indexes(db).await?;
    create_invoice_indexes(db).await?;
    create_business_card_indexes(db).await?;
    create_notification_indexes(db).await?;

    info!("MongoDB indexes initialized successfully");
    Ok(())
}

fn unique(keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn plain(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

async fn create_user_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    db.collection::<Document>("users")
        .create_index(unique(doc! { "email": 1 }))
        .await?;

    info!("Created indexes on users");
    Ok(())
}

async fn create_tenant_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    for name in TENANT_COLLECTIONS {
        db.collection::<Document>(name)
            .create_index(plain(doc! { "userId": 1, "createdAt": -1 }))
            .await?;
    }

    // Documents listed per client
    for name in ["devis", "invoices", "appointments"] {
        db.collection::<Document>(name)
            .create_index(plain(doc! { "userId": 1, "clientId": 1 }))
            .await?;
    }

    db.collection::<Document>("appointments")
        .create_index(plain(doc! { "userId": 1, "start": 1 }))
        .await?;

    info!("Created tenant indexes");
    Ok(())
}

async fn create_invoice_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Unique system-wide
    db.collection::<Document>("invoices")
        .create_index(unique(doc! { "invoiceNumber": 1 }))
        .await?;

    info!("Created indexes on invoices");
    Ok(())
}

async fn create_business_card_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    db.collection::<Document>("business_cards")
        .create_index(unique(doc! { "userId": 1 }))
        .await?;

    info!("Created indexes on business_cards");
    Ok(())
}

async fn create_notification_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Only entries carrying a key take part in uniqueness
    db.collection::<Document>("notifications")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "userId": 1, "dedupKey": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "dedupKey": { "$exists": true } })
                        .build(),
                )
                .build(),
        )
        .await?;

    db.collection::<Document>("notifications")
        .create_index(plain(doc! { "userId": 1, "date": -1 }))
        .await?;

    info!("Created indexes on notifications");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let client = mongodb::Client::with_uri_str(
            "mongodb://127.0.0.1:9/?serverSelectionTimeoutMS=200&connectTimeoutMS=200",
        )
        .await
        .unwrap();

        let result = initialize_indexes(&client.database("gestio_indexes_test")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_unique_model_sets_unique_option() {
        let model = unique(doc! { "email": 1 });
        assert_eq!(model.options.and_then(|o| o.unique), Some(true));
        assert!(plain(doc! { "userId": 1 }).options.is_none());
    }
}
