//! Invoice use cases: create, update, status change, send.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::entity::{format_invoice_number, Invoice};
use super::repository::InvoiceStore;
use crate::billing::{
    compute_totals, deserialize_line_items, Amount, BillingError, ClientSnapshot, InvoiceStatus,
    IssuerSnapshot, LineItem, StatusLifecycle,
};
use crate::client::repository::ClientStore;
use crate::devis::entity::Devis;
use crate::devis::repository::DevisStore;
use crate::notification::entity::{Notification, NotificationCategory, NotificationKind};
use crate::notification::service::NotificationService;
use crate::shared::api_common::{deserialize_optional_date, non_blank};
use crate::shared::error::PlatformError;
use crate::shared::mailer::{Mailer, OutgoingMail};
use crate::try_use_case;
use crate::usecase::{ExecutionContext, UseCaseError, UseCaseResult};
use crate::user::repository::UserStore;

/// A number typed by hand can already hold the next counter value
const NUMBER_ATTEMPTS: u32 = 5;

/// Body of create and update. A client-supplied `amount` is ignored.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCommand {
    /// Defaults to the client of the first linked devis
    pub client_id: Option<String>,

    #[serde(default)]
    pub devis_ids: Vec<String>,

    /// Generated as `FAC-<year>-<seq>` when absent
    pub invoice_number: Option<String>,

    /// Copied from the linked devis when absent or empty
    #[serde(default, deserialize_with = "deserialize_line_items")]
    pub line_items: Option<Vec<LineItem>>,

    /// Percentage in [0, 100]
    #[schema(value_type = Option<String>, example = "10")]
    pub discount: Option<Amount>,

    #[schema(value_type = Option<String>, example = "20")]
    pub tax_rate: Option<Amount>,

    pub payment_terms: Option<String>,

    pub notes: Option<String>,

    #[serde(default, deserialize_with = "deserialize_optional_date")]
    #[schema(value_type = Option<String>, format = Date)]
    pub issue_date: Option<NaiveDate>,

    #[serde(default, deserialize_with = "deserialize_optional_date")]
    #[schema(value_type = Option<String>, format = Date)]
    pub due_date: Option<NaiveDate>,

    pub status: Option<String>,
}

/// Checked numeric and status fields of an [`InvoiceCommand`]
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceInput {
    pub discount: Decimal,
    pub tax_rate: Option<Decimal>,
    pub status: Option<InvoiceStatus>,
}

impl InvoiceCommand {
    pub fn validate(&self) -> Result<InvoiceInput, UseCaseError> {
        let mut details = std::collections::HashMap::new();

        let discount = match &self.discount {
            None => Some(Decimal::ZERO),
            Some(amount) => amount.value(),
        };
        if discount.is_none() {
            details.insert("discount".to_string(), serde_json::json!("Remise invalide"));
        }

        let tax_rate = match &self.tax_rate {
            None => Some(None),
            Some(amount) => amount.value().map(Some),
        };
        if tax_rate.is_none() {
            details.insert("taxRate".to_string(), serde_json::json!("Taux de TVA invalide"));
        }

        if let (Some(issued), Some(due)) = (self.issue_date, self.due_date) {
            if due < issued {
                details.insert(
                    "dueDate".to_string(),
                    serde_json::json!("L'échéance précède la date de facture"),
                );
            }
        }

        if self.devis_ids.iter().any(|id| id.trim().is_empty()) {
            details.insert("devisIds".to_string(), serde_json::json!("Référence de devis vide"));
        }

        let (Some(discount), Some(tax_rate)) = (discount, tax_rate) else {
            return Err(UseCaseError::validation_with_details(
                "INVALID_INVOICE",
                "Données invalides",
                details,
            ));
        };
        if !details.is_empty() {
            return Err(UseCaseError::validation_with_details(
                "INVALID_INVOICE",
                "Données invalides",
                details,
            ));
        }

        if discount < Decimal::ZERO || discount > Decimal::ONE_HUNDRED {
            return Err(BillingError::DiscountOutOfRange { value: discount }.into());
        }

        let status = self
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(InvoiceStatus::parse_status)
            .transpose()?;

        Ok(InvoiceInput {
            discount,
            tax_rate,
            status,
        })
    }

    fn requested_number(&self) -> Option<String> {
        non_blank(self.invoice_number.clone())
    }

    fn requested_client(&self) -> Option<String> {
        non_blank(self.client_id.clone())
    }
}

/// Match each requested id to an owned devis, keeping request order.
///
/// The first id with no owned devis fails the whole request. A repeated id
/// is linked once.
pub fn resolve_devis_refs(requested: &[String], found: &[Devis]) -> Result<Vec<Devis>, UseCaseError> {
    let mut resolved: Vec<Devis> = Vec::with_capacity(requested.len());
    for (index, id) in requested.iter().enumerate() {
        let id = id.trim();
        if resolved.iter().any(|d| d.id == id) {
            continue;
        }
        let devis = found.iter().find(|d| d.id == id).ok_or_else(|| {
            UseCaseError::not_found_field(
                "DEVIS_NOT_FOUND",
                "Devis introuvable",
                format!("devisIds[{}]", index),
                id,
            )
        })?;
        resolved.push(devis.clone());
    }
    Ok(resolved)
}

/// Explicit lines win; otherwise the lines of every linked devis, in order.
pub fn invoice_line_items(explicit: Option<Vec<LineItem>>, devis: &[Devis]) -> Vec<LineItem> {
    match explicit {
        Some(items) if !items.is_empty() => items,
        _ => devis.iter().flat_map(|d| d.line_items.iter().cloned()).collect(),
    }
}

/// E-mail carrying the invoice summary to the client
pub fn invoice_mail(invoice: &Invoice) -> Option<OutgoingMail> {
    let to = invoice.client.client_email.trim();
    if to.is_empty() {
        return None;
    }

    let totals = compute_totals(&invoice.line_items);
    let issuer = invoice
        .issuer
        .entreprise_name
        .clone()
        .unwrap_or_else(|| "Votre prestataire".to_string());

    let mut body = format!("Bonjour {},\n\n", invoice.client.client_name);
    body.push_str(&format!(
        "Veuillez trouver ci-dessous le récapitulatif de la facture {}.\n\n",
        invoice.invoice_number
    ));
    for item in &invoice.line_items {
        body.push_str(&format!("- {}\n", item.description));
    }
    body.push_str(&format!("\nTotal HT : {} €\n", totals.total_ht));
    if !invoice.discount.is_zero() {
        body.push_str(&format!("Remise : {} %\n", invoice.discount.normalize()));
    }
    body.push_str(&format!("Total TTC : {} €\n", invoice.amount));
    if let Some(due) = invoice.due_date {
        body.push_str(&format!("Échéance : {}\n", due.format("%d/%m/%Y")));
    }
    if let Some(terms) = &invoice.payment_terms {
        body.push_str(&format!("Conditions de paiement : {}\n", terms));
    }
    body.push_str(&format!("\nCordialement,\n{}\n", issuer));

    Some(OutgoingMail {
        to: to.to_string(),
        subject: format!("Facture {} - {}", invoice.invoice_number, issuer),
        body,
    })
}

/// Inbox entry announcing an invoice status change
pub fn status_notification(invoice: &Invoice) -> Notification {
    let kind = match invoice.status {
        InvoiceStatus::Paid => NotificationKind::Success,
        InvoiceStatus::Overdue => NotificationKind::Warning,
        InvoiceStatus::Canceled => NotificationKind::Error,
        _ => NotificationKind::Info,
    };
    Notification::new(
        &invoice.user_id,
        kind,
        NotificationCategory::Invoice,
        "Statut de la facture mis à jour",
        format!(
            "La facture {} ({} €) est maintenant : {}",
            invoice.invoice_number,
            invoice.amount,
            invoice.status.as_str()
        ),
    )
    .with_invoice(&invoice.id)
    .with_client(&invoice.client_id)
}

fn invoice_not_found() -> UseCaseError {
    UseCaseError::not_found("INVOICE_NOT_FOUND", "Facture introuvable")
}

fn client_not_found(id: &str) -> UseCaseError {
    UseCaseError::not_found_field("CLIENT_NOT_FOUND", "Client introuvable", "clientId", id)
}

fn copy_details(command: &InvoiceCommand, input: &InvoiceInput, invoice: &mut Invoice) {
    invoice.tax_rate = input.tax_rate;
    invoice.payment_terms = non_blank(command.payment_terms.clone());
    invoice.notes = non_blank(command.notes.clone());
    invoice.issue_date = command.issue_date;
    invoice.due_date = command.due_date;
    invoice.updated_at = Utc::now();
}

pub struct CreateInvoiceUseCase {
    invoice_repo: Arc<dyn InvoiceStore>,
    devis_repo: Arc<dyn DevisStore>,
    client_repo: Arc<dyn ClientStore>,
    user_repo: Arc<dyn UserStore>,
}

impl CreateInvoiceUseCase {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceStore>,
        devis_repo: Arc<dyn DevisStore>,
        client_repo: Arc<dyn ClientStore>,
        user_repo: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            invoice_repo,
            devis_repo,
            client_repo,
            user_repo,
        }
    }

    pub async fn execute(&self, command: InvoiceCommand, ctx: ExecutionContext) -> UseCaseResult<Invoice> {
        let input = try_use_case!(command.validate());
        let user_id = ctx.principal_id.as_str();

        let requested: Vec<String> = command.devis_ids.iter().map(|id| id.trim().to_string()).collect();
        let found = try_use_case!(self.devis_repo.find_by_ids(user_id, &requested).await);
        let devis = try_use_case!(resolve_devis_refs(&requested, &found));

        let Some(client_id) = command
            .requested_client()
            .or_else(|| devis.first().map(|d| d.client_id.clone()))
        else {
            return UseCaseResult::failure(UseCaseError::validation_with_details(
                "INVALID_INVOICE",
                "Le client est obligatoire",
                crate::details! { "clientId" => "Le client est obligatoire" },
            ));
        };
        let client = match try_use_case!(self.client_repo.find_by_id(user_id, &client_id).await) {
            Some(client) => client,
            None => return UseCaseResult::failure(client_not_found(&client_id)),
        };

        let user = match try_use_case!(self.user_repo.find_by_id(user_id).await) {
            Some(user) => user,
            None => return UseCaseResult::failure(UseCaseError::not_found("USER_NOT_FOUND", "Compte introuvable")),
        };

        let mut invoice = Invoice::new(user_id, &client.id, command.requested_number().unwrap_or_default());
        invoice.devis_ids = devis.iter().map(|d| d.id.clone()).collect();
        invoice.issuer = IssuerSnapshot::from(&user.company);
        invoice.client = ClientSnapshot::from(&client);
        try_use_case!(invoice.set_pricing(invoice_line_items(command.line_items.clone(), &devis), input.discount));
        if let Some(status) = input.status {
            invoice.set_status(status);
        }
        copy_details(&command, &input, &mut invoice);

        match command.requested_number() {
            Some(_) => try_use_case!(self.invoice_repo.insert(&invoice).await),
            None => try_use_case!(self.insert_numbered(&mut invoice).await),
        }

        info!(
            execution_id = %ctx.execution_id,
            user_id = %user_id,
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            amount = %invoice.amount,
            "Invoice created"
        );
        UseCaseResult::success(invoice)
    }

    /// Insert under the next counter value of the issue year.
    async fn insert_numbered(&self, invoice: &mut Invoice) -> Result<(), PlatformError> {
        let year = invoice.issue_date.map(|d| d.year()).unwrap_or_else(|| Utc::now().year());

        let mut last_error = None;
        for _ in 0..NUMBER_ATTEMPTS {
            let sequence = self.invoice_repo.next_sequence(year).await?;
            invoice.invoice_number = format_invoice_number(year, sequence);
            match self.invoice_repo.insert(invoice).await {
                Ok(()) => return Ok(()),
                Err(err @ PlatformError::Duplicate { .. }) => {
                    warn!(invoice_number = %invoice.invoice_number, "Invoice number taken, drawing the next one");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or_else(|| PlatformError::internal("Invoice numbering failed")))
    }
}

pub struct UpdateInvoiceUseCase {
    invoice_repo: Arc<dyn InvoiceStore>,
    devis_repo: Arc<dyn DevisStore>,
    client_repo: Arc<dyn ClientStore>,
}

impl UpdateInvoiceUseCase {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceStore>,
        devis_repo: Arc<dyn DevisStore>,
        client_repo: Arc<dyn ClientStore>,
    ) -> Self {
        Self {
            invoice_repo,
            devis_repo,
            client_repo,
        }
    }

    pub async fn execute(
        &self,
        invoice_id: &str,
        command: InvoiceCommand,
        ctx: ExecutionContext,
    ) -> UseCaseResult<Invoice> {
        let input = try_use_case!(command.validate());
        let user_id = ctx.principal_id.as_str();

        let mut invoice = match try_use_case!(self.invoice_repo.find_by_id(user_id, invoice_id).await) {
            Some(invoice) => invoice,
            None => return UseCaseResult::failure(invoice_not_found()),
        };

        let requested: Vec<String> = command.devis_ids.iter().map(|id| id.trim().to_string()).collect();
        let found = try_use_case!(self.devis_repo.find_by_ids(user_id, &requested).await);
        let devis = try_use_case!(resolve_devis_refs(&requested, &found));

        if let Some(client_id) = command.requested_client() {
            if client_id != invoice.client_id {
                let client = match try_use_case!(self.client_repo.find_by_id(user_id, &client_id).await) {
                    Some(client) => client,
                    None => return UseCaseResult::failure(client_not_found(&client_id)),
                };
                invoice.client_id = client.id.clone();
                invoice.client = ClientSnapshot::from(&client);
            }
        }

        if let Some(status) = input.status {
            let status = try_use_case!(invoice.status.transition_to(status));
            invoice.set_status(status);
        }
        if let Some(number) = command.requested_number() {
            invoice.invoice_number = number;
        }
        invoice.devis_ids = devis.iter().map(|d| d.id.clone()).collect();
        try_use_case!(invoice.set_pricing(invoice_line_items(command.line_items.clone(), &devis), input.discount));
        copy_details(&command, &input, &mut invoice);

        try_use_case!(self.invoice_repo.update(&invoice).await);

        info!(execution_id = %ctx.execution_id, invoice_id = %invoice.id, "Invoice updated");
        UseCaseResult::success(invoice)
    }
}

pub struct ChangeInvoiceStatusUseCase {
    invoice_repo: Arc<dyn InvoiceStore>,
    notifications: Arc<NotificationService>,
}

impl ChangeInvoiceStatusUseCase {
    pub fn new(invoice_repo: Arc<dyn InvoiceStore>, notifications: Arc<NotificationService>) -> Self {
        Self {
            invoice_repo,
            notifications,
        }
    }

    pub async fn execute(&self, invoice_id: &str, status: &str, ctx: ExecutionContext) -> UseCaseResult<Invoice> {
        let target = try_use_case!(InvoiceStatus::parse_status(status));
        self.change(invoice_id, |_| target, ctx).await
    }

    /// Step to the next status of the cycle
    /// `draft -> pending -> paid -> overdue -> canceled -> draft`.
    pub async fn advance(&self, invoice_id: &str, ctx: ExecutionContext) -> UseCaseResult<Invoice> {
        self.change(invoice_id, |current| current.next_in_cycle(), ctx).await
    }

    async fn change(
        &self,
        invoice_id: &str,
        target: impl FnOnce(InvoiceStatus) -> InvoiceStatus,
        ctx: ExecutionContext,
    ) -> UseCaseResult<Invoice> {
        let mut invoice = match try_use_case!(self.invoice_repo.find_by_id(&ctx.principal_id, invoice_id).await) {
            Some(invoice) => invoice,
            None => return UseCaseResult::failure(invoice_not_found()),
        };

        let target = try_use_case!(invoice.status.transition_to(target(invoice.status)));
        let previous = invoice.status;
        if !invoice.set_status(target) {
            return UseCaseResult::success(invoice);
        }

        try_use_case!(self.invoice_repo.update(&invoice).await);

        info!(
            execution_id = %ctx.execution_id,
            invoice_id = %invoice.id,
            from = previous.as_str(),
            to = target.as_str(),
            "Invoice status changed"
        );

        self.notifications.notify(status_notification(&invoice)).await;
        UseCaseResult::success(invoice)
    }
}

pub struct SendInvoiceUseCase {
    invoice_repo: Arc<dyn InvoiceStore>,
    mailer: Arc<dyn Mailer>,
    notifications: Arc<NotificationService>,
}

impl SendInvoiceUseCase {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceStore>,
        mailer: Arc<dyn Mailer>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            invoice_repo,
            mailer,
            notifications,
        }
    }

    pub async fn execute(&self, invoice_id: &str, ctx: ExecutionContext) -> UseCaseResult<Invoice> {
        let mut invoice = match try_use_case!(self.invoice_repo.find_by_id(&ctx.principal_id, invoice_id).await) {
            Some(invoice) => invoice,
            None => return UseCaseResult::failure(invoice_not_found()),
        };

        if invoice.status == InvoiceStatus::Canceled {
            return UseCaseResult::failure(UseCaseError::business_rule(
                "INVOICE_CANCELED",
                "Une facture annulée ne peut pas être envoyée",
            ));
        }

        let Some(mail) = invoice_mail(&invoice) else {
            return UseCaseResult::failure(UseCaseError::validation_with_details(
                "CLIENT_EMAIL_MISSING",
                "Le client n'a pas d'adresse e-mail",
                crate::details! { "clientEmail" => "Adresse e-mail manquante" },
            ));
        };
        let recipient = mail.to.clone();

        try_use_case!(self.mailer.send(mail).await);

        invoice.mark_sent(Utc::now());
        try_use_case!(self.invoice_repo.update(&invoice).await);

        info!(
            execution_id = %ctx.execution_id,
            invoice_id = %invoice.id,
            recipient = %recipient,
            "Invoice sent"
        );

        let notification = Notification::new(
            &invoice.user_id,
            NotificationKind::Success,
            NotificationCategory::Invoice,
            "Facture envoyée",
            format!("La facture {} a été envoyée à {}", invoice.invoice_number, recipient),
        )
        .with_invoice(&invoice.id)
        .with_client(&invoice.client_id);
        self.notifications.notify(notification).await;

        UseCaseResult::success(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn command(json: serde_json::Value) -> InvoiceCommand {
        serde_json::from_value(json).unwrap()
    }

    fn devis_with(id: &str, items: Vec<LineItem>) -> Devis {
        let mut devis = Devis::new("u1", "c1", "Devis");
        devis.id = id.to_string();
        devis.set_line_items(items);
        devis
    }

    #[test]
    fn test_validate_defaults() {
        let input = command(serde_json::json!({ "clientId": "c1" })).validate().unwrap();
        assert_eq!(input.discount, Decimal::ZERO);
        assert_eq!(input.tax_rate, None);
        assert_eq!(input.status, None);
    }

    #[test]
    fn test_validate_accepts_french_decimals() {
        let input = command(serde_json::json!({ "discount": "12,5", "taxRate": "20", "status": "pending" }))
            .validate()
            .unwrap();
        assert_eq!(input.discount, dec!(12.5));
        assert_eq!(input.tax_rate, Some(dec!(20)));
        assert_eq!(input.status, Some(InvoiceStatus::Pending));
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let err = command(serde_json::json!({
            "discount": "beaucoup",
            "issueDate": "2024-03-10",
            "dueDate": "2024-03-01"
        }))
        .validate()
        .unwrap_err();
        match err {
            UseCaseError::ValidationError { details, .. } => {
                assert!(details.contains_key("discount"));
                assert!(details.contains_key("dueDate"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = command(serde_json::json!({ "discount": 120 })).validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_DISCOUNT");

        let err = command(serde_json::json!({ "status": "payée" })).validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_STATUS");
    }

    #[test]
    fn test_resolve_devis_refs_names_missing_id() {
        let found = vec![devis_with("d1", vec![])];
        let requested = vec!["d1".to_string(), "other-user-devis".to_string()];

        match resolve_devis_refs(&requested, &found).unwrap_err() {
            UseCaseError::NotFoundError { details, .. } => {
                assert_eq!(details.get("field"), Some(&serde_json::json!("devisIds[1]")));
                assert_eq!(details.get("id"), Some(&serde_json::json!("other-user-devis")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_devis_refs_keeps_request_order() {
        let found = vec![devis_with("d1", vec![]), devis_with("d2", vec![])];
        let requested = vec!["d2".to_string(), "d1".to_string()];
        let resolved = resolve_devis_refs(&requested, &found).unwrap();
        assert_eq!(resolved[0].id, "d2");
        assert_eq!(resolved[1].id, "d1");
    }

    #[test]
    fn test_repeated_devis_id_is_billed_once() {
        let found = vec![devis_with("d1", vec![LineItem::new("Pose", dec!(100), 1, 20)])];
        let requested = vec!["d1".to_string(), " d1 ".to_string()];
        let resolved = resolve_devis_refs(&requested, &found).unwrap();
        assert_eq!(resolved.len(), 1);

        let items = invoice_line_items(None, &resolved);
        assert_eq!(crate::billing::invoice_amount(&items, Decimal::ZERO).unwrap(), dec!(120.00));
    }

    #[test]
    fn test_line_items_from_devis() {
        let devis = vec![
            devis_with("d1", vec![LineItem::new("Pose", dec!(100), 1, 20)]),
            devis_with("d2", vec![LineItem::new("Dépose", dec!(50), 2, 10)]),
        ];
        let items = invoice_line_items(None, &devis);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].description, "Dépose");

        let items = invoice_line_items(Some(vec![]), &devis);
        assert_eq!(items.len(), 2);

        let explicit = vec![LineItem::new("Forfait", dec!(10), 1, 0)];
        assert_eq!(invoice_line_items(Some(explicit.clone()), &devis), explicit);
    }

    #[test]
    fn test_invoice_mail() {
        let mut invoice = Invoice::new("u1", "c1", "FAC-2024-003");
        invoice
            .set_pricing(vec![LineItem::new("Pose", dec!(100), 2, 20)], dec!(10))
            .unwrap();
        invoice.client.client_name = "Jean Dupont".into();
        invoice.client.client_email = "jean@example.com".into();
        invoice.issuer.entreprise_name = Some("Atelier Martin".into());

        let mail = invoice_mail(&invoice).unwrap();
        assert_eq!(mail.to, "jean@example.com");
        assert!(mail.subject.contains("FAC-2024-003"));
        assert!(mail.body.contains("Total TTC : 216.00"));
        assert!(mail.body.contains("Remise : 10 %"));

        invoice.client.client_email = " ".into();
        assert!(invoice_mail(&invoice).is_none());
    }

    #[test]
    fn test_status_notification() {
        let mut invoice = Invoice::new("u1", "c1", "FAC-2024-003");
        invoice.set_status(InvoiceStatus::Pending);
        invoice.set_status(InvoiceStatus::Paid);
        let n = status_notification(&invoice);
        assert_eq!(n.kind, NotificationKind::Success);
        assert_eq!(n.category, NotificationCategory::Invoice);
        assert_eq!(n.invoice_id.as_deref(), Some(invoice.id.as_str()));
        assert!(n.message.contains("FAC-2024-003"));
    }
}
