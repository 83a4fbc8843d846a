//! Appointments API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::entity::{parse_instant, Appointment, AppointmentFields, AppointmentStatus, ValidAppointment};
use super::repository::AppointmentRepository;
use crate::billing::StatusLifecycle;
use crate::client::repository::ClientRepository;
use crate::notification::entity::{Notification, NotificationCategory, NotificationKind};
use crate::notification::service::NotificationService;
use crate::service_catalog::repository::ServiceRepository;
use crate::shared::api_common::{FieldError, StatusRequest, SuccessResponse};
use crate::shared::error::PlatformError;
use crate::shared::middleware::Authenticated;
use crate::user::entity::Feature;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    pub title: String,
    pub start: String,
    pub end: String,
    pub status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Appointment> for AppointmentResponse {
    fn from(a: Appointment) -> Self {
        Self {
            id: a.id,
            client_id: a.client_id,
            service_id: a.service_id,
            title: a.title,
            start: a.start.to_rfc3339(),
            end: a.end.to_rfc3339(),
            status: a.status,
            notes: a.notes,
            created_at: a.created_at.to_rfc3339(),
            updated_at: a.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, Default, IntoParams)]
pub struct AppointmentsQuery {
    /// Lower bound, RFC 3339 or YYYY-MM-DD
    pub from: Option<String>,
    /// Upper bound (exclusive), RFC 3339 or YYYY-MM-DD
    pub to: Option<String>,
}

impl AppointmentsQuery {
    fn bounds(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), PlatformError> {
        let mut errors = Vec::new();
        let mut parse = |field: &str, value: &Option<String>| match value.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let parsed = parse_instant(raw);
                if parsed.is_none() {
                    errors.push(FieldError::new(field, "Date invalide"));
                }
                parsed
            }
        };
        let from = parse("from", &self.from);
        let to = parse("to", &self.to);
        if !errors.is_empty() {
            return Err(PlatformError::invalid_fields(errors));
        }
        Ok((from, to))
    }
}

#[derive(Clone)]
pub struct AppointmentsState {
    pub appointment_repo: Arc<AppointmentRepository>,
    pub client_repo: Arc<ClientRepository>,
    pub service_repo: Arc<ServiceRepository>,
    pub notifications: Arc<NotificationService>,
}

impl AppointmentsState {
    async fn load(&self, user_id: &str, id: &str) -> Result<Appointment, PlatformError> {
        self.appointment_repo
            .find_by_id(user_id, id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Rendez-vous", id))
    }

    /// Check the referenced client and service belong to the caller, then
    /// validate the schedule.
    async fn resolve(&self, user_id: &str, fields: AppointmentFields) -> Result<ValidAppointment, PlatformError> {
        let mut service_minutes = None;
        if let Some(service_id) = fields.service_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let service = self
                .service_repo
                .find_by_id(user_id, service_id)
                .await?
                .ok_or_else(|| PlatformError::not_found_field("Prestation", "serviceId", service_id))?;
            service_minutes = Some(service.duration);
        }
        if let Some(client_id) = fields.client_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            self.client_repo
                .find_by_id(user_id, client_id)
                .await?
                .ok_or_else(|| PlatformError::not_found_field("Client", "clientId", client_id))?;
        }
        fields.validated(service_minutes)
    }
}

fn appointment_notification(appointment: &Appointment, title: &str) -> Notification {
    let kind = match appointment.status {
        AppointmentStatus::Cancelled => NotificationKind::Warning,
        AppointmentStatus::Completed => NotificationKind::Success,
        _ => NotificationKind::Info,
    };
    let mut notification = Notification::new(
        &appointment.user_id,
        kind,
        NotificationCategory::Appointment,
        title,
        format!(
            "« {} » le {} ({})",
            appointment.title,
            appointment.start.format("%d/%m/%Y à %H:%M"),
            appointment.status.as_str()
        ),
    )
    .with_appointment(&appointment.id);
    if let Some(client_id) = &appointment.client_id {
        notification = notification.with_client(client_id);
    }
    notification
}

/// List appointments
#[utoipa::path(
    get,
    path = "",
    tag = "appointments",
    operation_id = "getAppointments",
    params(AppointmentsQuery),
    responses(
        (status = 200, description = "Appointments intersecting the range, earliest first", body = Vec<AppointmentResponse>),
        (status = 400, description = "Malformed bound"),
        (status = 403, description = "Plan does not include appointments")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_appointments(
    State(state): State<AppointmentsState>,
    auth: Authenticated,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<Vec<AppointmentResponse>>, PlatformError> {
    auth.require_feature(Feature::Appointments)?;

    let (from, to) = query.bounds()?;
    let appointments = state.appointment_repo.find_in_range(&auth.user_id, from, to).await?;
    Ok(Json(appointments.into_iter().map(AppointmentResponse::from).collect()))
}

/// Book an appointment
#[utoipa::path(
    post,
    path = "",
    tag = "appointments",
    operation_id = "postAppointments",
    request_body = AppointmentFields,
    responses(
        (status = 201, description = "Appointment created", body = AppointmentResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Client or service not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_appointment(
    State(state): State<AppointmentsState>,
    auth: Authenticated,
    Json(req): Json<AppointmentFields>,
) -> Result<(StatusCode, Json<AppointmentResponse>), PlatformError> {
    auth.require_feature(Feature::Appointments)?;

    let fields = state.resolve(&auth.user_id, req).await?;
    let appointment = Appointment::new(&auth.user_id, fields);
    state.appointment_repo.insert(&appointment).await?;

    info!(user_id = %auth.user_id, appointment_id = %appointment.id, start = %appointment.start, "Appointment created");
    state
        .notifications
        .notify(appointment_notification(&appointment, "Nouveau rendez-vous"))
        .await;
    Ok((StatusCode::CREATED, Json(appointment.into())))
}

/// Get an appointment
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "appointments",
    operation_id = "getAppointmentById",
    params(("id" = String, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Appointment found", body = AppointmentResponse),
        (status = 404, description = "Appointment not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_appointment(
    State(state): State<AppointmentsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<AppointmentResponse>, PlatformError> {
    auth.require_feature(Feature::Appointments)?;
    Ok(Json(state.load(&auth.user_id, &id).await?.into()))
}

/// Reschedule or edit an appointment
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "appointments",
    operation_id = "putAppointmentById",
    params(("id" = String, Path, description = "Appointment ID")),
    request_body = AppointmentFields,
    responses(
        (status = 200, description = "Appointment updated", body = AppointmentResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Appointment, client or service not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_appointment(
    State(state): State<AppointmentsState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(req): Json<AppointmentFields>,
) -> Result<Json<AppointmentResponse>, PlatformError> {
    auth.require_feature(Feature::Appointments)?;

    let mut appointment = state.load(&auth.user_id, &id).await?;
    let fields = state.resolve(&auth.user_id, req).await?;
    if let Some(status) = fields.status {
        let status = appointment.status.transition_to(status)?;
        appointment.set_status(status);
    }
    appointment.apply(fields);
    state.appointment_repo.update(&appointment).await?;

    Ok(Json(appointment.into()))
}

/// Change an appointment status
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tag = "appointments",
    operation_id = "patchAppointmentStatus",
    params(("id" = String, Path, description = "Appointment ID")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status changed", body = AppointmentResponse),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Appointment not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_appointment_status(
    State(state): State<AppointmentsState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<AppointmentResponse>, PlatformError> {
    auth.require_feature(Feature::Appointments)?;

    let status = AppointmentStatus::parse_status(&req.status)?;
    let mut appointment = state.load(&auth.user_id, &id).await?;
    let status = appointment.status.transition_to(status)?;
    if appointment.set_status(status) {
        state.appointment_repo.update(&appointment).await?;
        info!(appointment_id = %appointment.id, status = status.as_str(), "Appointment status changed");
        state
            .notifications
            .notify(appointment_notification(&appointment, "Rendez-vous mis à jour"))
            .await;
    }

    Ok(Json(appointment.into()))
}

/// Delete an appointment
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "appointments",
    operation_id = "deleteAppointmentById",
    params(("id" = String, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Appointment deleted", body = SuccessResponse),
        (status = 404, description = "Appointment not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_appointment(
    State(state): State<AppointmentsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, PlatformError> {
    auth.require_feature(Feature::Appointments)?;

    if !state.appointment_repo.delete(&auth.user_id, &id).await? {
        return Err(PlatformError::not_found("Rendez-vous", &id));
    }
    info!(user_id = %auth.user_id, appointment_id = %id, "Appointment deleted");
    Ok(Json(SuccessResponse::with_message("Rendez-vous supprimé")))
}

pub fn appointments_router(state: AppointmentsState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_appointments, create_appointment))
        .routes(routes!(get_appointment, update_appointment, delete_appointment))
        .routes(routes!(update_appointment_status))
        .with_state(state)
}
