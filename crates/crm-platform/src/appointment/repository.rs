//! Appointment Repository

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions, Collection, Database};

use super::entity::Appointment;
use crate::shared::error::Result;

/// Filter matching appointments that intersect `[from, to)`.
pub fn range_filter(
    user_id: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> bson::Document {
    let mut filter = doc! { "userId": user_id };
    if let Some(to) = to {
        filter.insert("start", doc! { "$lt": bson::DateTime::from_chrono(to) });
    }
    if let Some(from) = from {
        filter.insert("end", doc! { "$gt": bson::DateTime::from_chrono(from) });
    }
    filter
}

pub struct AppointmentRepository {
    collection: Collection<Appointment>,
}

impl AppointmentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("appointments"),
        }
    }

    pub async fn insert(&self, appointment: &Appointment) -> Result<()> {
        self.collection.insert_one(appointment).await?;
        Ok(())
    }

    pub async fn find_by_id(&self, user_id: &str, id: &str) -> Result<Option<Appointment>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id, "userId": user_id })
            .await?)
    }

    /// Earliest first
    pub async fn find_in_range(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Appointment>> {
        let options = FindOptions::builder().sort(doc! { "start": 1 }).build();
        let cursor = self
            .collection
            .find(range_filter(user_id, from, to))
            .with_options(options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn update(&self, appointment: &Appointment) -> Result<()> {
        self.collection
            .replace_one(
                doc! { "_id": &appointment.id, "userId": &appointment.user_id },
                appointment,
            )
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_range_filter() {
        let from = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();

        let filter = range_filter("u1", Some(from), Some(to));
        assert_eq!(filter.get_str("userId").unwrap(), "u1");
        assert_eq!(
            filter.get_document("start").unwrap().get_datetime("$lt").unwrap(),
            &bson::DateTime::from_chrono(to)
        );
        assert_eq!(
            filter.get_document("end").unwrap().get_datetime("$gt").unwrap(),
            &bson::DateTime::from_chrono(from)
        );

        let open = range_filter("u1", None, None);
        assert_eq!(open.len(), 1);
    }
}
