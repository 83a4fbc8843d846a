//! Clients API
//!
//! Tenant-scoped CRUD plus the public lead form behind a business card and
//! the CSV import.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::entity::{Client, ClientFields, ClientSource, ClientStatus};
use super::import::{ensure_csv, parse_clients};
use super::repository::ClientRepository;
use crate::billing::StatusLifecycle;
use crate::business_card::repository::BusinessCardRepository;
use crate::devis::repository::DevisRepository;
use crate::invoice::repository::InvoiceRepository;
use crate::notification::entity::{Notification, NotificationCategory, NotificationKind};
use crate::notification::service::NotificationService;
use crate::shared::api_common::{StatusRequest, SuccessResponse};
use crate::shared::error::PlatformError;
use crate::shared::middleware::Authenticated;
use crate::user::entity::Feature;
use crate::user::repository::UserRepository;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub status: ClientStatus,
    pub source: ClientSource,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Client> for ClientResponse {
    fn from(c: Client) -> Self {
        Self {
            id: c.id,
            name: c.name,
            email: c.email,
            phone: c.phone,
            company: c.company,
            notes: c.notes,
            address: c.address,
            postal_code: c.postal_code,
            city: c.city,
            status: c.status,
            source: c.source,
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, Default, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ClientsQuery {
    /// Filter by status
    pub status: Option<String>,
}

/// Multipart upload with the CSV in `file`
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImportUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    /// Clients created
    pub created: usize,
    /// Data rows read
    pub total: usize,
}

#[derive(Clone)]
pub struct ClientsState {
    pub client_repo: Arc<ClientRepository>,
    pub devis_repo: Arc<DevisRepository>,
    pub invoice_repo: Arc<InvoiceRepository>,
    pub user_repo: Arc<UserRepository>,
    pub card_repo: Arc<BusinessCardRepository>,
    pub notifications: Arc<NotificationService>,
}

impl ClientsState {
    async fn load(&self, user_id: &str, id: &str) -> Result<Client, PlatformError> {
        self.client_repo
            .find_by_id(user_id, id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Client", id))
    }
}

/// List clients
#[utoipa::path(
    get,
    path = "",
    tag = "clients",
    operation_id = "getClients",
    params(ClientsQuery),
    responses(
        (status = 200, description = "Clients, newest first", body = Vec<ClientResponse>),
        (status = 400, description = "Unknown status filter")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_clients(
    State(state): State<ClientsState>,
    auth: Authenticated,
    Query(query): Query<ClientsQuery>,
) -> Result<Json<Vec<ClientResponse>>, PlatformError> {
    let clients = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(status) => {
            let status = ClientStatus::parse_status(status)?;
            state.client_repo.find_by_status(&auth.user_id, status).await?
        }
        None => state.client_repo.find_all(&auth.user_id).await?,
    };

    Ok(Json(clients.into_iter().map(ClientResponse::from).collect()))
}

/// Create a client
#[utoipa::path(
    post,
    path = "",
    tag = "clients",
    operation_id = "postClients",
    request_body = ClientFields,
    responses(
        (status = 201, description = "Client created", body = ClientResponse),
        (status = 400, description = "Validation error")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_client(
    State(state): State<ClientsState>,
    auth: Authenticated,
    Json(req): Json<ClientFields>,
) -> Result<(StatusCode, Json<ClientResponse>), PlatformError> {
    let client = Client::new(&auth.user_id, req.validated()?, ClientSource::Manual);
    state.client_repo.insert(&client).await?;

    info!(user_id = %auth.user_id, client_id = %client.id, "Client created");
    Ok((StatusCode::CREATED, Json(client.into())))
}

/// Get a client
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "clients",
    operation_id = "getClientsById",
    params(("id" = String, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Client found", body = ClientResponse),
        (status = 404, description = "Client not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_client(
    State(state): State<ClientsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ClientResponse>, PlatformError> {
    Ok(Json(state.load(&auth.user_id, &id).await?.into()))
}

/// Replace a client's details
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "clients",
    operation_id = "putClientsById",
    params(("id" = String, Path, description = "Client ID")),
    request_body = ClientFields,
    responses(
        (status = 200, description = "Client updated", body = ClientResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Client not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_client(
    State(state): State<ClientsState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(req): Json<ClientFields>,
) -> Result<Json<ClientResponse>, PlatformError> {
    let mut client = state.load(&auth.user_id, &id).await?;
    client.apply(req.validated()?);
    state.client_repo.update(&client).await?;

    Ok(Json(client.into()))
}

/// Change a client's status
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tag = "clients",
    operation_id = "patchClientsStatus",
    params(("id" = String, Path, description = "Client ID")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ClientResponse),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Client not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_client_status(
    State(state): State<ClientsState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<ClientResponse>, PlatformError> {
    let status = ClientStatus::parse_status(&req.status)?;
    let mut client = state.load(&auth.user_id, &id).await?;
    let status = client.status.transition_to(status)?;
    client.set_status(status);
    state.client_repo.update(&client).await?;

    Ok(Json(client.into()))
}

/// Delete a client with no devis or invoice
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "clients",
    operation_id = "deleteClientsById",
    params(("id" = String, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Client deleted", body = SuccessResponse),
        (status = 404, description = "Client not found"),
        (status = 409, description = "Client still referenced by devis or invoices")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_client(
    State(state): State<ClientsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, PlatformError> {
    let client = state.load(&auth.user_id, &id).await?;

    let devis = state.devis_repo.count_by_client(&auth.user_id, &client.id).await?;
    let invoices = state.invoice_repo.count_by_client(&auth.user_id, &client.id).await?;
    if devis > 0 || invoices > 0 {
        return Err(PlatformError::conflict(format!(
            "Ce client est lié à {} devis et {} facture(s). Supprimez-les avant de supprimer le client.",
            devis, invoices
        )));
    }

    state.client_repo.delete(&auth.user_id, &client.id).await?;
    info!(user_id = %auth.user_id, client_id = %client.id, "Client deleted");
    Ok(Json(SuccessResponse::with_message("Client supprimé")))
}

/// Public lead form of a business card
#[utoipa::path(
    post,
    path = "/register/{user_id}",
    tag = "clients",
    operation_id = "postClientsRegister",
    params(("user_id" = String, Path, description = "Card owner")),
    request_body = ClientFields,
    responses(
        (status = 201, description = "Lead registered", body = SuccessResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Unknown card owner")
    )
)]
pub async fn register_lead(
    State(state): State<ClientsState>,
    Path(user_id): Path<String>,
    Json(req): Json<ClientFields>,
) -> Result<(StatusCode, Json<SuccessResponse>), PlatformError> {
    let fields = req.validated()?;
    let owner = state
        .user_repo
        .find_by_id(&user_id)
        .await?
        .ok_or_else(|| PlatformError::not_found("Compte", &user_id))?;

    let client = Client::new(&owner.id, fields, ClientSource::BusinessCard);
    state.client_repo.insert(&client).await?;
    state.card_repo.record_form_submission(&owner.id).await?;

    state
        .notifications
        .notify(
            Notification::new(
                &owner.id,
                NotificationKind::Success,
                NotificationCategory::Client,
                "Nouveau prospect",
                format!("{} a rempli le formulaire de votre carte de visite", client.name),
            )
            .with_client(&client.id),
        )
        .await;

    info!(user_id = %owner.id, client_id = %client.id, "Lead registered from business card");
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_message("Merci, vos coordonnées ont bien été transmises")),
    ))
}

/// Import clients from a CSV file
#[utoipa::path(
    post,
    path = "/import",
    tag = "clients",
    operation_id = "postClientsImport",
    request_body(content = ImportUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Import done", body = ImportResponse),
        (status = 400, description = "Missing, empty or non-CSV file"),
        (status = 403, description = "Plan without client import")
    ),
    security(("bearer_auth" = []))
)]
pub async fn import_clients(
    State(state): State<ClientsState>,
    auth: Authenticated,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, PlatformError> {
    auth.require_feature(Feature::ClientImport)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PlatformError::validation(format!("Envoi invalide : {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PlatformError::validation(format!("Envoi invalide : {}", e)))?;
        upload = Some((file_name, content_type, bytes));
        break;
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| PlatformError::validation("Aucun fichier reçu (champ « file »)"))?;
    ensure_csv(file_name.as_deref(), content_type.as_deref(), &bytes)?;

    let batch = parse_clients(&bytes)?;
    let clients: Vec<Client> = batch
        .rows
        .iter()
        .cloned()
        .map(|fields| Client::new(&auth.user_id, fields, ClientSource::Import))
        .collect();
    let created = state.client_repo.insert_many(&clients).await?;

    info!(
        user_id = %auth.user_id,
        created,
        skipped = batch.skipped(),
        "Clients imported"
    );
    Ok(Json(ImportResponse {
        created,
        total: batch.total,
    }))
}

pub fn clients_router(state: ClientsState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_clients, create_client))
        .routes(routes!(import_clients))
        .routes(routes!(register_lead))
        .routes(routes!(get_client, update_client, delete_client))
        .routes(routes!(update_client_status))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_response_shape() {
        let client = Client::new(
            "u1",
            ClientFields::new("Jean Dupont", "jean@dupont.fr", "0612345678"),
            ClientSource::Manual,
        );
        let json = serde_json::to_value(ClientResponse::from(client.clone())).unwrap();
        assert_eq!(json["id"], client.id);
        assert_eq!(json["status"], "nouveau");
        assert_eq!(json["source"], "manual");
        assert!(json.get("userId").is_none());
        assert!(json.get("company").is_none());
    }
}
