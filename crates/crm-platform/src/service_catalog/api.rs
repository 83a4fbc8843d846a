//! Services API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::entity::{Service, ServiceFields};
use super::repository::ServiceRepository;
use crate::shared::api_common::SuccessResponse;
use crate::shared::error::PlatformError;
use crate::shared::middleware::Authenticated;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub id: String,
    pub name: String,
    /// Minutes
    pub duration: i64,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Service> for ServiceResponse {
    fn from(s: Service) -> Self {
        Self {
            id: s.id,
            name: s.name,
            duration: s.duration,
            price: s.price,
            color: s.color,
            description: s.description,
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct ServicesState {
    pub service_repo: Arc<ServiceRepository>,
}

impl ServicesState {
    async fn load(&self, user_id: &str, id: &str) -> Result<Service, PlatformError> {
        self.service_repo
            .find_by_id(user_id, id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Prestation", id))
    }
}

/// List services
#[utoipa::path(
    get,
    path = "",
    tag = "services",
    operation_id = "getServices",
    responses((status = 200, description = "Services", body = Vec<ServiceResponse>)),
    security(("bearer_auth" = []))
)]
pub async fn list_services(
    State(state): State<ServicesState>,
    auth: Authenticated,
) -> Result<Json<Vec<ServiceResponse>>, PlatformError> {
    let services = state.service_repo.find_all(&auth.user_id).await?;
    Ok(Json(services.into_iter().map(ServiceResponse::from).collect()))
}

/// Create a service
#[utoipa::path(
    post,
    path = "",
    tag = "services",
    operation_id = "postServices",
    request_body = ServiceFields,
    responses(
        (status = 201, description = "Service created", body = ServiceResponse),
        (status = 400, description = "Validation error")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_service(
    State(state): State<ServicesState>,
    auth: Authenticated,
    Json(req): Json<ServiceFields>,
) -> Result<(StatusCode, Json<ServiceResponse>), PlatformError> {
    let service = Service::new(&auth.user_id, req.validated()?);
    state.service_repo.insert(&service).await?;

    info!(user_id = %auth.user_id, service_id = %service.id, "Service created");
    Ok((StatusCode::CREATED, Json(service.into())))
}

/// Get a service
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "services",
    operation_id = "getServiceById",
    params(("id" = String, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Service found", body = ServiceResponse),
        (status = 404, description = "Service not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_service(
    State(state): State<ServicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ServiceResponse>, PlatformError> {
    Ok(Json(state.load(&auth.user_id, &id).await?.into()))
}

/// Replace a service
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "services",
    operation_id = "putServiceById",
    params(("id" = String, Path, description = "Service ID")),
    request_body = ServiceFields,
    responses(
        (status = 200, description = "Service updated", body = ServiceResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Service not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_service(
    State(state): State<ServicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(req): Json<ServiceFields>,
) -> Result<Json<ServiceResponse>, PlatformError> {
    let fields = req.validated()?;
    let mut service = state.load(&auth.user_id, &id).await?;
    service.apply(fields);
    state.service_repo.update(&service).await?;

    Ok(Json(service.into()))
}

/// Delete a service
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "services",
    operation_id = "deleteServiceById",
    params(("id" = String, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Service deleted", body = SuccessResponse),
        (status = 404, description = "Service not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_service(
    State(state): State<ServicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, PlatformError> {
    if !state.service_repo.delete(&auth.user_id, &id).await? {
        return Err(PlatformError::not_found("Prestation", &id));
    }
    info!(user_id = %auth.user_id, service_id = %id, "Service deleted");
    Ok(Json(SuccessResponse::with_message("Prestation supprimée")))
}

pub fn services_router(state: ServicesState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_services, create_service))
        .routes(routes!(get_service, update_service, delete_service))
        .with_state(state)
}
