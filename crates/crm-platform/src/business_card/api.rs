//! Business Cards API
//!
//! Owner endpoints are gated by the `business_card` feature. The public
//! view and the scan counter need no authentication.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::entity::{BusinessCard, CardAction, CardConfig, CardStats, QrPosition};
use super::repository::BusinessCardRepository;
use crate::shared::api_common::{non_blank, SuccessResponse};
use crate::shared::error::PlatformError;
use crate::shared::middleware::Authenticated;
use crate::user::entity::Feature;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BusinessCardResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_image: Option<String>,
    pub card_config: CardConfig,
    pub stats: CardStats,
    pub created_at: String,
    pub updated_at: String,
}

impl From<BusinessCard> for BusinessCardResponse {
    fn from(c: BusinessCard) -> Self {
        Self {
            id: c.id,
            card_image: c.card_image,
            card_config: c.card_config,
            stats: c.stats,
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}

/// What a visitor sees after scanning the card
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicCardResponse {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_image: Option<String>,
    pub show_qr: bool,
    pub qr_position: QrPosition,
    pub qr_size: u32,
    /// Active actions in display order
    pub actions: Vec<CardAction>,
}

impl From<BusinessCard> for PublicCardResponse {
    fn from(c: BusinessCard) -> Self {
        Self {
            actions: c.card_config.visible_actions(),
            user_id: c.user_id,
            card_image: c.card_image,
            show_qr: c.card_config.show_qr,
            qr_position: c.card_config.qr_position,
            qr_size: c.card_config.qr_size,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveCardRequest {
    pub card_image: Option<String>,
    #[serde(default)]
    pub card_config: CardConfig,
}

#[derive(Clone)]
pub struct BusinessCardsState {
    pub card_repo: Arc<BusinessCardRepository>,
}

impl BusinessCardsState {
    async fn load(&self, user_id: &str) -> Result<BusinessCard, PlatformError> {
        self.card_repo
            .find_by_user(user_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Carte de visite", user_id))
    }
}

/// The caller's card
#[utoipa::path(
    get,
    path = "/me",
    tag = "business-cards",
    operation_id = "getBusinessCardMe",
    responses(
        (status = 200, description = "Card found", body = BusinessCardResponse),
        (status = 403, description = "Plan without business card"),
        (status = 404, description = "No card yet")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_my_card(
    State(state): State<BusinessCardsState>,
    auth: Authenticated,
) -> Result<Json<BusinessCardResponse>, PlatformError> {
    auth.require_feature(Feature::BusinessCard)?;
    Ok(Json(state.load(&auth.user_id).await?.into()))
}

/// Create the card, or replace its image and config
#[utoipa::path(
    post,
    path = "",
    tag = "business-cards",
    operation_id = "postBusinessCards",
    request_body = SaveCardRequest,
    responses(
        (status = 201, description = "Card created", body = BusinessCardResponse),
        (status = 200, description = "Card updated", body = BusinessCardResponse),
        (status = 400, description = "Invalid config"),
        (status = 403, description = "Plan without business card")
    ),
    security(("bearer_auth" = []))
)]
pub async fn save_card(
    State(state): State<BusinessCardsState>,
    auth: Authenticated,
    Json(req): Json<SaveCardRequest>,
) -> Result<(StatusCode, Json<BusinessCardResponse>), PlatformError> {
    auth.require_feature(Feature::BusinessCard)?;

    let config = req.card_config.validated()?;
    let image = non_blank(req.card_image);

    if state.card_repo.find_by_user(&auth.user_id).await?.is_none() {
        let card = BusinessCard::new(&auth.user_id, image.clone(), config.clone());
        match state.card_repo.insert(&card).await {
            Ok(()) => {
                info!(user_id = %auth.user_id, card_id = %card.id, "Business card created");
                return Ok((StatusCode::CREATED, Json(card.into())));
            }
            // created concurrently, fall through to the update
            Err(PlatformError::Duplicate { .. }) => {
                debug!(user_id = %auth.user_id, "Business card created concurrently, updating");
            }
            Err(e) => return Err(e),
        }
    }

    state
        .card_repo
        .update_content(&auth.user_id, image.as_deref(), &config)
        .await?;
    info!(user_id = %auth.user_id, "Business card updated");
    Ok((StatusCode::OK, Json(state.load(&auth.user_id).await?.into())))
}

/// Replace the card config only
#[utoipa::path(
    put,
    path = "/config",
    tag = "business-cards",
    operation_id = "putBusinessCardConfig",
    request_body = CardConfig,
    responses(
        (status = 200, description = "Config saved", body = BusinessCardResponse),
        (status = 400, description = "Invalid config"),
        (status = 404, description = "No card yet")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_card_config(
    State(state): State<BusinessCardsState>,
    auth: Authenticated,
    Json(config): Json<CardConfig>,
) -> Result<Json<BusinessCardResponse>, PlatformError> {
    auth.require_feature(Feature::BusinessCard)?;

    let config = config.validated()?;
    if !state.card_repo.update_config(&auth.user_id, &config).await? {
        return Err(PlatformError::not_found("Carte de visite", &auth.user_id));
    }
    Ok(Json(state.load(&auth.user_id).await?.into()))
}

/// Delete the caller's card
#[utoipa::path(
    delete,
    path = "",
    tag = "business-cards",
    operation_id = "deleteBusinessCards",
    responses(
        (status = 200, description = "Card deleted", body = SuccessResponse),
        (status = 404, description = "No card")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_card(
    State(state): State<BusinessCardsState>,
    auth: Authenticated,
) -> Result<Json<SuccessResponse>, PlatformError> {
    auth.require_feature(Feature::BusinessCard)?;

    if !state.card_repo.delete(&auth.user_id).await? {
        return Err(PlatformError::not_found("Carte de visite", &auth.user_id));
    }
    info!(user_id = %auth.user_id, "Business card deleted");
    Ok(Json(SuccessResponse::with_message("Carte de visite supprimée")))
}

/// Public view of a card
#[utoipa::path(
    get,
    path = "/public/{user_id}",
    tag = "business-cards",
    operation_id = "getBusinessCardPublic",
    params(("user_id" = String, Path, description = "Card owner")),
    responses(
        (status = 200, description = "Card found", body = PublicCardResponse),
        (status = 404, description = "No card")
    )
)]
pub async fn get_public_card(
    State(state): State<BusinessCardsState>,
    Path(user_id): Path<String>,
) -> Result<Json<PublicCardResponse>, PlatformError> {
    Ok(Json(state.load(&user_id).await?.into()))
}

/// Count a scan of the card
#[utoipa::path(
    post,
    path = "/track-view/{user_id}",
    tag = "business-cards",
    operation_id = "postBusinessCardTrackView",
    params(("user_id" = String, Path, description = "Card owner")),
    responses(
        (status = 200, description = "View recorded", body = SuccessResponse),
        (status = 404, description = "No card")
    )
)]
pub async fn track_view(
    State(state): State<BusinessCardsState>,
    Path(user_id): Path<String>,
) -> Result<Json<SuccessResponse>, PlatformError> {
    if !state.card_repo.record_view(&user_id, Utc::now()).await? {
        return Err(PlatformError::not_found("Carte de visite", &user_id));
    }
    Ok(Json(SuccessResponse::ok()))
}

pub fn business_cards_router(state: BusinessCardsState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(save_card, delete_card))
        .routes(routes!(get_my_card))
        .routes(routes!(update_card_config))
        .routes(routes!(get_public_card))
        .routes(routes!(track_view))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_view_hides_inactive_actions_and_stats() {
        let config: CardConfig = serde_json::from_value(serde_json::json!({
            "qrPosition": "center",
            "actions": [
                { "type": "website", "url": "https://atelier.fr", "order": 1 },
                { "type": "form", "order": 0, "active": false }
            ]
        }))
        .unwrap();
        let card = BusinessCard::new("u1", None, config);

        let json = serde_json::to_value(PublicCardResponse::from(card)).unwrap();
        assert_eq!(json["qrPosition"], "center");
        assert_eq!(json["actions"].as_array().unwrap().len(), 1);
        assert_eq!(json["actions"][0]["type"], "website");
        assert!(json.get("stats").is_none());
    }
}
