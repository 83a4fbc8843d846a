//! Devis API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::entity::Devis;
use super::operations::{ChangeDevisStatusUseCase, CreateDevisUseCase, DevisCommand, UpdateDevisUseCase};
use super::repository::DevisRepository;
use crate::billing::{
    compute_totals, ClientSnapshot, DevisStatus, DocumentTotals, IssuerSnapshot, LineItem,
    StatusLifecycle,
};
use crate::client::repository::ClientRepository;
use crate::notification::service::NotificationService;
use crate::shared::api_common::{StatusRequest, SuccessResponse};
use crate::shared::error::PlatformError;
use crate::shared::middleware::Authenticated;
use crate::usecase::ExecutionContext;
use crate::user::repository::UserRepository;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevisResponse {
    pub id: String,
    pub client_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub date_devis: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub date_validite: Option<NaiveDate>,
    pub line_items: Vec<LineItem>,
    pub status: DevisStatus,
    /// TTC total
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[serde(flatten)]
    pub issuer: IssuerSnapshot,
    #[serde(flatten)]
    pub client: ClientSnapshot,
    pub status_changed_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Devis> for DevisResponse {
    fn from(d: Devis) -> Self {
        Self {
            id: d.id,
            client_id: d.client_id,
            title: d.title,
            description: d.description,
            date_devis: d.date_devis,
            date_validite: d.date_validite,
            line_items: d.line_items,
            status: d.status,
            amount: d.amount,
            issuer: d.issuer,
            client: d.client,
            status_changed_at: d.status_changed_at.to_rfc3339(),
            created_at: d.created_at.to_rfc3339(),
            updated_at: d.updated_at.to_rfc3339(),
        }
    }
}

/// Everything the PDF renderer needs
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevisSummaryResponse {
    pub devis: DevisResponse,
    pub totals: DocumentTotals,
}

#[derive(Debug, Deserialize, Default, IntoParams)]
pub struct DevisQuery {
    /// Filter by status
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct DevisState {
    pub devis_repo: Arc<DevisRepository>,
    pub client_repo: Arc<ClientRepository>,
    pub user_repo: Arc<UserRepository>,
    pub notifications: Arc<NotificationService>,
}

impl DevisState {
    async fn load(&self, user_id: &str, id: &str) -> Result<Devis, PlatformError> {
        self.devis_repo
            .find_by_id(user_id, id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Devis", id))
    }
}

/// List devis
#[utoipa::path(
    get,
    path = "",
    tag = "devis",
    operation_id = "getDevis",
    params(DevisQuery),
    responses(
        (status = 200, description = "Devis, newest first", body = Vec<DevisResponse>),
        (status = 400, description = "Unknown status filter")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_devis(
    State(state): State<DevisState>,
    auth: Authenticated,
    Query(query): Query<DevisQuery>,
) -> Result<Json<Vec<DevisResponse>>, PlatformError> {
    let devis = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(status) => {
            let status = DevisStatus::parse_status(status)?;
            state.devis_repo.find_by_status(&auth.user_id, status).await?
        }
        None => state.devis_repo.find_all(&auth.user_id).await?,
    };
    Ok(Json(devis.into_iter().map(DevisResponse::from).collect()))
}

/// Create a devis
#[utoipa::path(
    post,
    path = "",
    tag = "devis",
    operation_id = "postDevis",
    request_body = DevisCommand,
    responses(
        (status = 201, description = "Devis created", body = DevisResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Client not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_devis(
    State(state): State<DevisState>,
    auth: Authenticated,
    Json(command): Json<DevisCommand>,
) -> Result<(StatusCode, Json<DevisResponse>), PlatformError> {
    let use_case = CreateDevisUseCase::new(
        state.devis_repo.clone(),
        state.client_repo.clone(),
        state.user_repo.clone(),
    );
    let devis = use_case
        .execute(command, ExecutionContext::create(&auth.user_id))
        .await
        .into_result()?;

    Ok((StatusCode::CREATED, Json(devis.into())))
}

/// Get a devis
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "devis",
    operation_id = "getDevisById",
    params(("id" = String, Path, description = "Devis ID")),
    responses(
        (status = 200, description = "Devis found", body = DevisResponse),
        (status = 404, description = "Devis not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_devis(
    State(state): State<DevisState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<DevisResponse>, PlatformError> {
    Ok(Json(state.load(&auth.user_id, &id).await?.into()))
}

/// Devis of one client
#[utoipa::path(
    get,
    path = "/client/{client_id}",
    tag = "devis",
    operation_id = "getDevisByClient",
    params(("client_id" = String, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Devis of the client", body = Vec<DevisResponse>),
        (status = 404, description = "Client not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_devis_for_client(
    State(state): State<DevisState>,
    auth: Authenticated,
    Path(client_id): Path<String>,
) -> Result<Json<Vec<DevisResponse>>, PlatformError> {
    state
        .client_repo
        .find_by_id(&auth.user_id, &client_id)
        .await?
        .ok_or_else(|| PlatformError::not_found("Client", &client_id))?;

    let devis = state.devis_repo.find_by_client(&auth.user_id, &client_id).await?;
    Ok(Json(devis.into_iter().map(DevisResponse::from).collect()))
}

/// Replace a devis
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "devis",
    operation_id = "putDevisById",
    params(("id" = String, Path, description = "Devis ID")),
    request_body = DevisCommand,
    responses(
        (status = 200, description = "Devis updated", body = DevisResponse),
        (status = 400, description = "Validation error or refused transition"),
        (status = 404, description = "Devis or client not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_devis(
    State(state): State<DevisState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(command): Json<DevisCommand>,
) -> Result<Json<DevisResponse>, PlatformError> {
    let use_case = UpdateDevisUseCase::new(state.devis_repo.clone(), state.client_repo.clone());
    let devis = use_case
        .execute(&id, command, ExecutionContext::create(&auth.user_id))
        .await
        .into_result()?;

    Ok(Json(devis.into()))
}

/// Change a devis status
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tag = "devis",
    operation_id = "patchDevisStatus",
    params(("id" = String, Path, description = "Devis ID")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status changed", body = DevisResponse),
        (status = 400, description = "Unknown status or refused transition"),
        (status = 404, description = "Devis not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_devis_status(
    State(state): State<DevisState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<DevisResponse>, PlatformError> {
    let use_case = ChangeDevisStatusUseCase::new(state.devis_repo.clone(), state.notifications.clone());
    let devis = use_case
        .execute(&id, &req.status, ExecutionContext::create(&auth.user_id))
        .await
        .into_result()?;

    Ok(Json(devis.into()))
}

/// Move a devis to the next status of its cycle
#[utoipa::path(
    post,
    path = "/{id}/status/next",
    tag = "devis",
    operation_id = "postDevisStatusNext",
    params(("id" = String, Path, description = "Devis ID")),
    responses(
        (status = 200, description = "Status advanced", body = DevisResponse),
        (status = 404, description = "Devis not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn advance_devis_status(
    State(state): State<DevisState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<DevisResponse>, PlatformError> {
    let use_case = ChangeDevisStatusUseCase::new(state.devis_repo.clone(), state.notifications.clone());
    let devis = use_case
        .advance(&id, ExecutionContext::create(&auth.user_id))
        .await
        .into_result()?;

    Ok(Json(devis.into()))
}

/// Delete a devis
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "devis",
    operation_id = "deleteDevisById",
    params(("id" = String, Path, description = "Devis ID")),
    responses(
        (status = 200, description = "Devis deleted", body = SuccessResponse),
        (status = 404, description = "Devis not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_devis(
    State(state): State<DevisState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, PlatformError> {
    if !state.devis_repo.delete(&auth.user_id, &id).await? {
        return Err(PlatformError::not_found("Devis", &id));
    }
    info!(user_id = %auth.user_id, devis_id = %id, "Devis deleted");
    Ok(Json(SuccessResponse::with_message("Devis supprimé")))
}

/// Totals and parties of a devis
#[utoipa::path(
    get,
    path = "/{id}/summary",
    tag = "devis",
    operation_id = "getDevisSummary",
    params(("id" = String, Path, description = "Devis ID")),
    responses(
        (status = 200, description = "Devis summary", body = DevisSummaryResponse),
        (status = 404, description = "Devis not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_devis_summary(
    State(state): State<DevisState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<DevisSummaryResponse>, PlatformError> {
    let devis = state.load(&auth.user_id, &id).await?;
    let totals = compute_totals(&devis.line_items);
    Ok(Json(DevisSummaryResponse {
        devis: devis.into(),
        totals,
    }))
}

pub fn devis_router(state: DevisState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_devis, create_devis))
        .routes(routes!(list_devis_for_client))
        .routes(routes!(get_devis, update_devis, delete_devis))
        .routes(routes!(update_devis_status))
        .routes(routes!(advance_devis_status))
        .routes(routes!(get_devis_summary))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_response_carries_amount_as_string() {
        let mut devis = Devis::new("u1", "c1", "Cuisine");
        devis.set_line_items(vec![LineItem::new("Pose", dec!(100), 2, 20)]);
        devis.client.client_name = "Jean Dupont".into();

        let json = serde_json::to_value(DevisResponse::from(devis)).unwrap();
        assert_eq!(json["amount"], "240.00");
        assert_eq!(json["clientName"], "Jean Dupont");
        assert_eq!(json["status"], "nouveau");
        assert!(json.get("userId").is_none());
    }
}
