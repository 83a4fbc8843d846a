//! Appointment Entity

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::billing::StatusLifecycle;
use crate::shared::api_common::{non_blank, FieldErrors};
use crate::shared::error::{PlatformError, Result};
use crate::service_catalog::entity::MAX_DURATION_MINUTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl Default for AppointmentStatus {
    fn default() -> Self {
        Self::Scheduled
    }
}

// Appointments can be rescheduled or reopened from any state.
impl StatusLifecycle for AppointmentStatus {
    const FIELD: &'static str = "status";

    fn all() -> &'static [Self] {
        &[Self::Scheduled, Self::Confirmed, Self::Completed, Self::Cancelled]
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            Self::Scheduled => &[Self::Confirmed, Self::Completed, Self::Cancelled],
            Self::Confirmed => &[Self::Scheduled, Self::Completed, Self::Cancelled],
            Self::Completed => &[Self::Scheduled, Self::Confirmed, Self::Cancelled],
            Self::Cancelled => &[Self::Scheduled, Self::Confirmed, Self::Completed],
        }
    }

    fn next_in_cycle(&self) -> Self {
        match self {
            Self::Scheduled => Self::Confirmed,
            Self::Confirmed => Self::Completed,
            Self::Completed => Self::Cancelled,
            Self::Cancelled => Self::Scheduled,
        }
    }
}

/// Parse an instant from a query string: RFC 3339, or a bare date taken as
/// midnight UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// `start` plus a service duration, `None` when the duration is out of range.
fn end_after(start: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
        return None;
    }
    start.checked_add_signed(TimeDelta::try_minutes(minutes)?)
}

/// Appointment form body
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentFields {
    pub client_id: Option<String>,

    pub service_id: Option<String>,

    #[serde(default)]
    pub title: String,

    pub start: Option<DateTime<Utc>>,

    /// Defaults to `start` plus the service duration
    pub end: Option<DateTime<Utc>>,

    pub notes: Option<String>,

    pub status: Option<String>,
}

/// Checked [`AppointmentFields`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidAppointment {
    pub client_id: Option<String>,
    pub service_id: Option<String>,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFields {
    /// `service_minutes` is the duration of the referenced service, used
    /// when no end is given.
    pub fn validated(self, service_minutes: Option<i64>) -> Result<ValidAppointment> {
        let mut errors = FieldErrors::new();
        errors.require("title", &self.title, "Le titre est obligatoire");

        let mut bad_duration = false;
        let end = match (self.end, self.start, service_minutes) {
            (Some(end), _, _) => Some(end),
            (None, Some(start), Some(minutes)) => {
                let end = end_after(start, minutes);
                bad_duration = end.is_none();
                end
            }
            _ => None,
        };
        let window = match (self.start, end) {
            (None, _) => {
                errors.add("start", "Le début est obligatoire");
                None
            }
            (Some(_), None) if bad_duration => {
                errors.add("end", "La durée du service est invalide");
                None
            }
            (Some(_), None) => {
                errors.add("end", "La fin est obligatoire");
                None
            }
            (Some(start), Some(end)) if start >= end => {
                errors.add("end", "La fin doit être postérieure au début");
                None
            }
            (Some(start), Some(end)) => Some((start, end)),
        };
        errors.finish()?;

        let status = self
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(AppointmentStatus::parse_status)
            .transpose()?;

        let Some((start, end)) = window else {
            return Err(PlatformError::validation("Horaires invalides"));
        };
        Ok(ValidAppointment {
            client_id: non_blank(self.client_id),
            service_id: non_blank(self.service_id),
            title: self.title.trim().to_string(),
            start,
            end,
            notes: non_blank(self.notes),
            status,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(rename = "_id")]
    pub id: String,

    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,

    pub title: String,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end: DateTime<Utc>,

    #[serde(default)]
    pub status: AppointmentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(user_id: impl Into<String>, fields: ValidAppointment) -> Self {
        let now = Utc::now();
        Self {
            id: crate::TsidGenerator::generate(),
            user_id: user_id.into(),
            client_id: fields.client_id,
            service_id: fields.service_id,
            title: fields.title,
            start: fields.start,
            end: fields.end,
            status: fields.status.unwrap_or_default(),
            notes: fields.notes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the schedule and details. The status is handled separately.
    pub fn apply(&mut self, fields: ValidAppointment) {
        self.client_id = fields.client_id;
        self.service_id = fields.service_id;
        self.title = fields.title;
        self.start = fields.start;
        self.end = fields.end;
        self.notes = fields.notes;
        self.updated_at = Utc::now();
    }

    /// Returns whether the status actually changed.
    pub fn set_status(&mut self, status: AppointmentStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.updated_at = Utc::now();
        true
    }

    /// True when the appointment intersects `[from, to)`.
    pub fn overlaps(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
        from.map_or(true, |from| self.end > from) && to.map_or(true, |to| self.start < to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, hour, 0, 0).unwrap()
    }

    fn fields(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> AppointmentFields {
        AppointmentFields {
            title: "Rendez-vous".into(),
            start,
            end,
            ..AppointmentFields::default()
        }
    }

    #[test]
    fn test_end_must_follow_start() {
        let err = fields(Some(at(10)), Some(at(10))).validated(None).unwrap_err();
        match err {
            PlatformError::Validation { errors, .. } => assert_eq!(errors[0].field, "end"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(fields(Some(at(11)), Some(at(10))).validated(None).is_err());
        assert!(fields(Some(at(10)), Some(at(11))).validated(None).is_ok());
    }

    #[test]
    fn test_end_defaults_to_service_duration() {
        let valid = fields(Some(at(9)), None).validated(Some(90)).unwrap();
        assert_eq!(valid.end, at(10) + Duration::minutes(30));

        assert!(fields(Some(at(9)), None).validated(None).is_err());
        assert!(fields(None, Some(at(9))).validated(Some(30)).is_err());
    }

    #[test]
    fn test_out_of_range_service_duration_is_rejected() {
        for minutes in [9_000_000_000_000_000, MAX_DURATION_MINUTES + 1, 0, -30] {
            let err = fields(Some(at(9)), None).validated(Some(minutes)).unwrap_err();
            match err {
                PlatformError::Validation { errors, .. } => assert_eq!(errors[0].field, "end"),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(fields(Some(at(9)), None).validated(Some(MAX_DURATION_MINUTES)).is_ok());
    }

    #[test]
    fn test_end_near_the_calendar_limit_is_rejected() {
        let start = DateTime::<Utc>::MAX_UTC - Duration::minutes(5);
        assert!(fields(Some(start), None).validated(Some(60)).is_err());
    }

    #[test]
    fn test_status_parsed() {
        let mut f = fields(Some(at(9)), Some(at(10)));
        f.status = Some("confirmed".into());
        assert_eq!(f.clone().validated(None).unwrap().status, Some(AppointmentStatus::Confirmed));

        f.status = Some("done".into());
        assert!(f.validated(None).is_err());
    }

    #[test]
    fn test_overlaps() {
        let appt = Appointment::new("u1", fields(Some(at(9)), Some(at(10))).validated(None).unwrap());
        assert!(appt.overlaps(None, None));
        assert!(appt.overlaps(Some(at(8)), Some(at(11))));
        assert!(appt.overlaps(Some(at(9)), Some(at(9) + Duration::minutes(1))));
        assert!(!appt.overlaps(Some(at(10)), None));
        assert!(!appt.overlaps(None, Some(at(9))));
    }

    #[test]
    fn test_parse_instant() {
        assert_eq!(parse_instant("2024-06-03"), Some(at(0)));
        assert_eq!(parse_instant("2024-06-03T09:00:00Z"), Some(at(9)));
        assert_eq!(parse_instant("2024-06-03T11:00:00+02:00"), Some(at(9)));
        assert_eq!(parse_instant("demain"), None);
    }

    #[test]
    fn test_any_status_may_follow() {
        for from in AppointmentStatus::all() {
            for to in AppointmentStatus::all() {
                assert!(from.can_transition_to(*to));
            }
        }
    }
}
