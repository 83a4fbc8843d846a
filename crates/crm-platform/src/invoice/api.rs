//! Invoice API

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

use super::entity::Invoice;
use super::operations::{
    ChangeInvoiceStatusUseCase, CreateInvoiceUseCase, InvoiceCommand, SendInvoiceUseCase,
    UpdateInvoiceUseCase,
};
use super::repository::InvoiceRepository;
use crate::billing::{
    compute_totals, discounted_totals, ClientSnapshot, DiscountedTotals, DocumentTotals,
    InvoiceStatus, IssuerSnapshot, LineItem, StatusLifecycle,
};
use crate::client::repository::ClientRepository;
use crate::devis::repository::DevisRepository;
use crate::notification::service::NotificationService;
use crate::shared::api_common::{StatusRequest, SuccessResponse};
use crate::shared::error::PlatformError;
use crate::shared::mailer::Mailer;
use crate::shared::middleware::Authenticated;
use crate::usecase::ExecutionContext;
use crate::user::entity::Feature;
use crate::user::repository::UserRepository;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub id: String,
    pub client_id: String,
    pub devis_ids: Vec<String>,
    pub invoice_number: String,
    pub line_items: Vec<LineItem>,
    #[schema(value_type = String)]
    pub discount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub tax_rate: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub issue_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub due_date: Option<NaiveDate>,
    pub status: InvoiceStatus,
    /// TTC after discount
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(flatten)]
    pub issuer: IssuerSnapshot,
    #[serde(flatten)]
    pub client: ClientSnapshot,
    pub status_changed_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Invoice> for InvoiceResponse {
    fn from(i: Invoice) -> Self {
        Self {
            id: i.id,
            client_id: i.client_id,
            devis_ids: i.devis_ids,
            invoice_number: i.invoice_number,
            line_items: i.line_items,
            discount: i.discount,
            tax_rate: i.tax_rate,
            payment_terms: i.payment_terms,
            notes: i.notes,
            issue_date: i.issue_date,
            due_date: i.due_date,
            status: i.status,
            amount: i.amount,
            sent_at: i.sent_at.map(|t| t.to_rfc3339()),
            issuer: i.issuer,
            client: i.client,
            status_changed_at: i.status_changed_at.to_rfc3339(),
            created_at: i.created_at.to_rfc3339(),
            updated_at: i.updated_at.to_rfc3339(),
        }
    }
}

/// Totals before and after the document discount
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummaryResponse {
    pub invoice: InvoiceResponse,
    pub totals: DocumentTotals,
    pub discount: DiscountedTotals,
}

#[derive(Debug, Deserialize, Default, IntoParams)]
pub struct InvoicesQuery {
    /// Filter by status
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct InvoicesState {
    pub invoice_repo: Arc<InvoiceRepository>,
    pub devis_repo: Arc<DevisRepository>,
    pub client_repo: Arc<ClientRepository>,
    pub user_repo: Arc<UserRepository>,
    pub notifications: Arc<NotificationService>,
    pub mailer: Arc<dyn Mailer>,
}

impl InvoicesState {
    async fn load(&self, user_id: &str, id: &str) -> Result<Invoice, PlatformError> {
        self.invoice_repo
            .find_by_id(user_id, id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Facture", id))
    }
}

/// List invoices
#[utoipa::path(
    get,
    path = "",
    tag = "invoices",
    operation_id = "getInvoices",
    params(InvoicesQuery),
    responses(
        (status = 200, description = "Invoices, newest first", body = Vec<InvoiceResponse>),
        (status = 400, description = "Unknown status filter"),
        (status = 403, description = "Plan does not include invoicing")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_invoices(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Query(query): Query<InvoicesQuery>,
) -> Result<Json<Vec<InvoiceResponse>>, PlatformError> {
    auth.require_feature(Feature::Invoices)?;

    let invoices = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(status) => {
            let status = InvoiceStatus::parse_status(status)?;
            state.invoice_repo.find_by_status(&auth.user_id, status).await?
        }
        None => state.invoice_repo.find_all(&auth.user_id).await?,
    };
    Ok(Json(invoices.into_iter().map(InvoiceResponse::from).collect()))
}

/// Create an invoice
#[utoipa::path(
    post,
    path = "",
    tag = "invoices",
    operation_id = "postInvoices",
    request_body = InvoiceCommand,
    responses(
        (status = 201, description = "Invoice created", body = InvoiceResponse),
        (status = 400, description = "Validation error or invoice number taken"),
        (status = 403, description = "Plan does not include invoicing"),
        (status = 404, description = "Client or devis not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_invoice(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Json(command): Json<InvoiceCommand>,
) -> Result<(StatusCode, Json<InvoiceResponse>), PlatformError> {
    auth.require_feature(Feature::Invoices)?;

    let use_case = CreateInvoiceUseCase::new(
        state.invoice_repo.clone(),
        state.devis_repo.clone(),
        state.client_repo.clone(),
        state.user_repo.clone(),
    );
    let invoice = use_case
        .execute(command, ExecutionContext::create(&auth.user_id))
        .await
        .into_result()?;

    Ok((StatusCode::CREATED, Json(invoice.into())))
}

/// Get an invoice
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "invoices",
    operation_id = "getInvoiceById",
    params(("id" = String, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice found", body = InvoiceResponse),
        (status = 404, description = "Invoice not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_invoice(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, PlatformError> {
    auth.require_feature(Feature::Invoices)?;
    Ok(Json(state.load(&auth.user_id, &id).await?.into()))
}

/// Invoices of one client
#[utoipa::path(
    get,
    path = "/client/{client_id}",
    tag = "invoices",
    operation_id = "getInvoicesByClient",
    params(("client_id" = String, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Invoices of the client", body = Vec<InvoiceResponse>),
        (status = 404, description = "Client not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_invoices_for_client(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Path(client_id): Path<String>,
) -> Result<Json<Vec<InvoiceResponse>>, PlatformError> {
    auth.require_feature(Feature::Invoices)?;

    state
        .client_repo
        .find_by_id(&auth.user_id, &client_id)
        .await?
        .ok_or_else(|| PlatformError::not_found("Client", &client_id))?;

    let invoices = state.invoice_repo.find_by_client(&auth.user_id, &client_id).await?;
    Ok(Json(invoices.into_iter().map(InvoiceResponse::from).collect()))
}

/// Replace an invoice
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "invoices",
    operation_id = "putInvoiceById",
    params(("id" = String, Path, description = "Invoice ID")),
    request_body = InvoiceCommand,
    responses(
        (status = 200, description = "Invoice updated", body = InvoiceResponse),
        (status = 400, description = "Validation error, refused transition or number taken"),
        (status = 404, description = "Invoice, client or devis not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_invoice(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(command): Json<InvoiceCommand>,
) -> Result<Json<InvoiceResponse>, PlatformError> {
    auth.require_feature(Feature::Invoices)?;

    let use_case = UpdateInvoiceUseCase::new(
        state.invoice_repo.clone(),
        state.devis_repo.clone(),
        state.client_repo.clone(),
    );
    let invoice = use_case
        .execute(&id, command, ExecutionContext::create(&auth.user_id))
        .await
        .into_result()?;

    Ok(Json(invoice.into()))
}

/// Change an invoice status
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tag = "invoices",
    operation_id = "patchInvoiceStatus",
    params(("id" = String, Path, description = "Invoice ID")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status changed", body = InvoiceResponse),
        (status = 400, description = "Unknown status or refused transition"),
        (status = 404, description = "Invoice not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_invoice_status(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<InvoiceResponse>, PlatformError> {
    auth.require_feature(Feature::Invoices)?;

    let use_case = ChangeInvoiceStatusUseCase::new(state.invoice_repo.clone(), state.notifications.clone());
    let invoice = use_case
        .execute(&id, &req.status, ExecutionContext::create(&auth.user_id))
        .await
        .into_result()?;

    Ok(Json(invoice.into()))
}

/// Move an invoice to the next status of its cycle
#[utoipa::path(
    post,
    path = "/{id}/status/next",
    tag = "invoices",
    operation_id = "postInvoiceStatusNext",
    params(("id" = String, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Status advanced", body = InvoiceResponse),
        (status = 403, description = "Plan does not include invoicing"),
        (status = 404, description = "Invoice not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn advance_invoice_status(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, PlatformError> {
    auth.require_feature(Feature::Invoices)?;

    let use_case = ChangeInvoiceStatusUseCase::new(state.invoice_repo.clone(), state.notifications.clone());
    let invoice = use_case
        .advance(&id, ExecutionContext::create(&auth.user_id))
        .await
        .into_result()?;

    Ok(Json(invoice.into()))
}

/// E-mail an invoice to its client
#[utoipa::path(
    post,
    path = "/{id}/send",
    tag = "invoices",
    operation_id = "postInvoiceSend",
    params(("id" = String, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice sent", body = InvoiceResponse),
        (status = 400, description = "Client has no e-mail address"),
        (status = 404, description = "Invoice not found"),
        (status = 409, description = "Invoice is canceled")
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_invoice(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, PlatformError> {
    auth.require_feature(Feature::Invoices)?;

    let use_case = SendInvoiceUseCase::new(
        state.invoice_repo.clone(),
        state.mailer.clone(),
        state.notifications.clone(),
    );
    let invoice = use_case
        .execute(&id, ExecutionContext::create(&auth.user_id))
        .await
        .into_result()?;

    Ok(Json(invoice.into()))
}

/// Delete an invoice
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "invoices",
    operation_id = "deleteInvoiceById",
    params(("id" = String, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice deleted", body = SuccessResponse),
        (status = 404, description = "Invoice not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_invoice(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, PlatformError> {
    auth.require_feature(Feature::Invoices)?;

    if !state.invoice_repo.delete(&auth.user_id, &id).await? {
        return Err(PlatformError::not_found("Facture", &id));
    }
    info!(user_id = %auth.user_id, invoice_id = %id, "Invoice deleted");
    Ok(Json(SuccessResponse::with_message("Facture supprimée")))
}

/// Totals, discount and parties of an invoice
#[utoipa::path(
    get,
    path = "/{id}/summary",
    tag = "invoices",
    operation_id = "getInvoiceSummary",
    params(("id" = String, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice summary", body = InvoiceSummaryResponse),
        (status = 404, description = "Invoice not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_invoice_summary(
    State(state): State<InvoicesState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<InvoiceSummaryResponse>, PlatformError> {
    auth.require_feature(Feature::Invoices)?;

    let invoice = state.load(&auth.user_id, &id).await?;
    let totals = compute_totals(&invoice.line_items);
    let discount = discounted_totals(&invoice.line_items, invoice.discount)?;
    Ok(Json(InvoiceSummaryResponse {
        invoice: invoice.into(),
        totals,
        discount,
    }))
}

pub fn invoices_router(state: InvoicesState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_invoices, create_invoice))
        .routes(routes!(list_invoices_for_client))
        .routes(routes!(get_invoice, update_invoice, delete_invoice))
        .routes(routes!(update_invoice_status))
        .routes(routes!(advance_invoice_status))
        .routes(routes!(send_invoice))
        .routes(routes!(get_invoice_summary))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_response_shape() {
        let mut invoice = Invoice::new("u1", "c1", "FAC-2024-010");
        invoice
            .set_pricing(vec![LineItem::new("Pose", dec!(100), 2, 20)], dec!(0))
            .unwrap();
        invoice.client.client_name = "Jean Dupont".into();

        let json = serde_json::to_value(InvoiceResponse::from(invoice.clone())).unwrap();
        assert_eq!(json["amount"], "240.00");
        assert_eq!(json["invoiceNumber"], "FAC-2024-010");
        assert_eq!(json["status"], "draft");
        assert_eq!(json["clientName"], "Jean Dupont");
        assert!(json.get("sentAt").is_none());
        assert!(json.get("userId").is_none());

        invoice.mark_sent(Utc::now());
        let json = serde_json::to_value(InvoiceResponse::from(invoice)).unwrap();
        assert!(json["sentAt"].is_string());
        assert_eq!(json["status"], "pending");
    }
}
