//! Devis use cases: create, update, status change.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use super::entity::Devis;
use super::repository::DevisStore;
use crate::billing::{
    deserialize_line_items, ClientSnapshot, DevisStatus, IssuerSnapshot, LineItem, StatusLifecycle,
};
use crate::client::repository::ClientStore;
use crate::notification::entity::{Notification, NotificationCategory, NotificationKind};
use crate::notification::service::NotificationService;
use crate::shared::api_common::deserialize_optional_date;
use crate::try_use_case;
use crate::usecase::{ExecutionContext, UseCaseError, UseCaseResult};
use crate::user::repository::UserStore;

const DEFAULT_TITLE: &str = "Devis";

/// Body of create and update. A client-supplied `amount` is ignored.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevisCommand {
    #[serde(default)]
    pub client_id: String,

    pub title: Option<String>,

    pub description: Option<String>,

    #[serde(default, deserialize_with = "deserialize_optional_date")]
    #[schema(value_type = Option<String>, format = Date)]
    pub date_devis: Option<NaiveDate>,

    #[serde(default, deserialize_with = "deserialize_optional_date")]
    #[schema(value_type = Option<String>, format = Date)]
    pub date_validite: Option<NaiveDate>,

    #[serde(default, deserialize_with = "deserialize_line_items")]
    pub line_items: Option<Vec<LineItem>>,

    /// Initial status on create, target status on update
    pub status: Option<String>,
}

impl DevisCommand {
    /// Field checks, returning the parsed status if one was given.
    pub fn validate(&self) -> Result<Option<DevisStatus>, UseCaseError> {
        let mut details = std::collections::HashMap::new();
        if self.client_id.trim().is_empty() {
            details.insert("clientId".to_string(), serde_json::json!("Le client est obligatoire"));
        }
        if let (Some(from), Some(until)) = (self.date_devis, self.date_validite) {
            if until < from {
                details.insert(
                    "dateValidite".to_string(),
                    serde_json::json!("La date de validité précède la date du devis"),
                );
            }
        }
        if !details.is_empty() {
            return Err(UseCaseError::validation_with_details(
                "INVALID_DEVIS",
                "Données invalides",
                details,
            ));
        }

        self.status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(DevisStatus::parse_status)
            .transpose()
            .map_err(UseCaseError::from)
    }

    /// Copy editable fields onto `devis` and recompute its amount.
    pub fn apply_to(self, devis: &mut Devis) {
        devis.title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        devis.description = crate::shared::api_common::non_blank(self.description);
        devis.date_devis = self.date_devis;
        devis.date_validite = self.date_validite;
        devis.set_line_items(self.line_items.unwrap_or_default());
        devis.updated_at = Utc::now();
    }
}

pub struct CreateDevisUseCase {
    devis_repo: Arc<dyn DevisStore>,
    client_repo: Arc<dyn ClientStore>,
    user_repo: Arc<dyn UserStore>,
}

impl CreateDevisUseCase {
    pub fn new(
        devis_repo: Arc<dyn DevisStore>,
        client_repo: Arc<dyn ClientStore>,
        user_repo: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            devis_repo,
            client_repo,
            user_repo,
        }
    }

    pub async fn execute(&self, command: DevisCommand, ctx: ExecutionContext) -> UseCaseResult<Devis> {
        let status = try_use_case!(command.validate());

        let client = match try_use_case!(
            self.client_repo.find_by_id(&ctx.principal_id, command.client_id.trim()).await
        ) {
            Some(client) => client,
            None => {
                return UseCaseResult::failure(UseCaseError::not_found_field(
                    "CLIENT_NOT_FOUND",
                    "Client introuvable",
                    "clientId",
                    command.client_id.as_str(),
                ))
            }
        };

        let user = match try_use_case!(self.user_repo.find_by_id(&ctx.principal_id).await) {
            Some(user) => user,
            None => return UseCaseResult::failure(UseCaseError::not_found("USER_NOT_FOUND", "Compte introuvable")),
        };

        let mut devis = Devis::new(&ctx.principal_id, &client.id, DEFAULT_TITLE);
        devis.issuer = IssuerSnapshot::from(&user.company);
        devis.client = ClientSnapshot::from(&client);
        if let Some(status) = status {
            devis.set_status(status);
        }
        command.apply_to(&mut devis);

        try_use_case!(self.devis_repo.insert(&devis).await);

        info!(
            execution_id = %ctx.execution_id,
            user_id = %ctx.principal_id,
            devis_id = %devis.id,
            amount = %devis.amount,
            "Devis created"
        );
        UseCaseResult::success(devis)
    }
}

pub struct UpdateDevisUseCase {
    devis_repo: Arc<dyn DevisStore>,
    client_repo: Arc<dyn ClientStore>,
}

impl UpdateDevisUseCase {
    pub fn new(devis_repo: Arc<dyn DevisStore>, client_repo: Arc<dyn ClientStore>) -> Self {
        Self {
            devis_repo,
            client_repo,
        }
    }

    pub async fn execute(
        &self,
        devis_id: &str,
        command: DevisCommand,
        ctx: ExecutionContext,
    ) -> UseCaseResult<Devis> {
        let status = try_use_case!(command.validate());

        let mut devis = match try_use_case!(self.devis_repo.find_by_id(&ctx.principal_id, devis_id).await) {
            Some(devis) => devis,
            None => return UseCaseResult::failure(UseCaseError::not_found("DEVIS_NOT_FOUND", "Devis introuvable")),
        };

        let client_id = command.client_id.trim().to_string();
        if client_id != devis.client_id {
            let client = match try_use_case!(self.client_repo.find_by_id(&ctx.principal_id, &client_id).await) {
                Some(client) => client,
                None => {
                    return UseCaseResult::failure(UseCaseError::not_found_field(
                        "CLIENT_NOT_FOUND",
                        "Client introuvable",
                        "clientId",
                        client_id,
                    ))
                }
            };
            devis.client_id = client.id.clone();
            devis.client = ClientSnapshot::from(&client);
        }

        if let Some(status) = status {
            let status = try_use_case!(devis.status.transition_to(status));
            devis.set_status(status);
        }
        command.apply_to(&mut devis);

        try_use_case!(self.devis_repo.update(&devis).await);

        info!(execution_id = %ctx.execution_id, devis_id = %devis.id, "Devis updated");
        UseCaseResult::success(devis)
    }
}

pub struct ChangeDevisStatusUseCase {
    devis_repo: Arc<dyn DevisStore>,
    notifications: Arc<NotificationService>,
}

impl ChangeDevisStatusUseCase {
    pub fn new(devis_repo: Arc<dyn DevisStore>, notifications: Arc<NotificationService>) -> Self {
        Self {
            devis_repo,
            notifications,
        }
    }

    pub async fn execute(&self, devis_id: &str, status: &str, ctx: ExecutionContext) -> UseCaseResult<Devis> {
        // Unknown values are refused before anything is read or written
        let target = try_use_case!(DevisStatus::parse_status(status));
        self.change(devis_id, |_| target, ctx).await
    }

    /// Step to the next status of the cycle
    /// `nouveau -> en_attente -> fini -> inactif -> nouveau`.
    pub async fn advance(&self, devis_id: &str, ctx: ExecutionContext) -> UseCaseResult<Devis> {
        self.change(devis_id, |current| current.next_in_cycle(), ctx).await
    }

    async fn change(
        &self,
        devis_id: &str,
        target: impl FnOnce(DevisStatus) -> DevisStatus,
        ctx: ExecutionContext,
    ) -> UseCaseResult<Devis> {
        let mut devis = match try_use_case!(self.devis_repo.find_by_id(&ctx.principal_id, devis_id).await) {
            Some(devis) => devis,
            None => return UseCaseResult::failure(UseCaseError::not_found("DEVIS_NOT_FOUND", "Devis introuvable")),
        };

        let target = try_use_case!(devis.status.transition_to(target(devis.status)));
        let previous = devis.status;
        if !devis.set_status(target) {
            return UseCaseResult::success(devis);
        }

        try_use_case!(self.devis_repo.update(&devis).await);

        info!(
            execution_id = %ctx.execution_id,
            devis_id = %devis.id,
            from = previous.as_str(),
            to = target.as_str(),
            "Devis status changed"
        );

        self.notifications.notify(status_notification(&devis)).await;
        UseCaseResult::success(devis)
    }
}

/// Inbox entry announcing a devis status change
pub fn status_notification(devis: &Devis) -> Notification {
    let kind = match devis.status {
        DevisStatus::Fini => NotificationKind::Success,
        DevisStatus::Inactif => NotificationKind::Warning,
        _ => NotificationKind::Info,
    };
    Notification::new(
        &devis.user_id,
        kind,
        NotificationCategory::Devis,
        "Statut du devis mis à jour",
        format!(
            "« {} » pour {} est maintenant : {}",
            devis.title,
            devis.client.client_name,
            devis.status.as_str()
        ),
    )
    .with_devis(&devis.id)
    .with_client(&devis.client_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn command(json: serde_json::Value) -> DevisCommand {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_client_supplied_amount_is_ignored() {
        let cmd = command(serde_json::json!({
            "clientId": "c1",
            "title": "Cuisine",
            "amount": 1,
            "lineItems": [{ "description": "Pose", "unitPrice": 100, "quantity": 2, "tvaRate": 20 }]
        }));
        assert!(cmd.validate().unwrap().is_none());

        let mut devis = Devis::new("u1", "c1", DEFAULT_TITLE);
        cmd.apply_to(&mut devis);
        assert_eq!(devis.amount, dec!(240.00));
        assert_eq!(devis.title, "Cuisine");
    }

    #[test]
    fn test_missing_client_and_inverted_dates() {
        let cmd = command(serde_json::json!({
            "dateDevis": "2024-06-10",
            "dateValidite": "2024-06-01"
        }));
        match cmd.validate().unwrap_err() {
            UseCaseError::ValidationError { details, .. } => {
                assert!(details.contains_key("clientId"));
                assert!(details.contains_key("dateValidite"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let cmd = command(serde_json::json!({ "clientId": "c1", "status": "archivé" }));
        assert_eq!(cmd.validate().unwrap_err().code(), "INVALID_STATUS");

        let cmd = command(serde_json::json!({ "clientId": "c1", "status": "en_attente" }));
        assert_eq!(cmd.validate().unwrap(), Some(DevisStatus::EnAttente));
    }

    #[test]
    fn test_blank_title_defaults_and_absent_items_clear() {
        let mut devis = Devis::new("u1", "c1", "Ancien");
        devis.set_line_items(vec![LineItem::new("x", 10, 1, 0)]);
        command(serde_json::json!({ "clientId": "c1", "title": "  ", "lineItems": "oops" }))
            .apply_to(&mut devis);
        assert_eq!(devis.title, DEFAULT_TITLE);
        assert!(devis.line_items.is_empty());
        assert_eq!(devis.amount, dec!(0));
    }

    #[test]
    fn test_status_notification() {
        let mut devis = Devis::new("u1", "c1", "Cuisine");
        devis.client.client_name = "Jean Dupont".into();
        devis.set_status(DevisStatus::Fini);

        let n = status_notification(&devis);
        assert_eq!(n.kind, NotificationKind::Success);
        assert_eq!(n.devis_id.as_deref(), Some(devis.id.as_str()));
        assert!(n.message.contains("Jean Dupont"));
        assert!(n.message.contains("fini"));
        assert!(n.dedup_key.is_none());
    }
}
