//! Notifications API
//!
//! The inbox endpoints, and the WebSocket that streams the caller's room.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::entity::NotificationResponse;
use super::hub::{room_name, NotificationHub};
use super::repository::NotificationRepository;
use crate::shared::api_common::SuccessResponse;
use crate::shared::error::PlatformError;
use crate::shared::middleware::{AppState, Authenticated};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InboxResponse {
    pub notifications: Vec<NotificationResponse>,
    pub unread_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadAllResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize, Default, IntoParams)]
pub struct InboxQuery {
    /// Only unread entries
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SocketQuery {
    /// Bearer token; browsers cannot set headers on a WebSocket
    pub token: String,
}

#[derive(Clone)]
pub struct NotificationsState {
    pub repo: Arc<NotificationRepository>,
    pub hub: Arc<NotificationHub>,
    pub auth: AppState,
}

/// The caller's inbox
#[utoipa::path(
    get,
    path = "",
    tag = "notifications",
    operation_id = "getNotifications",
    params(InboxQuery),
    responses((status = 200, description = "Inbox, newest first", body = InboxResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_notifications(
    State(state): State<NotificationsState>,
    auth: Authenticated,
    Query(query): Query<InboxQuery>,
) -> Result<Json<InboxResponse>, PlatformError> {
    let notifications = state.repo.find_for_user(&auth.user_id, query.unread).await?;
    let unread_count = state.repo.count_unread(&auth.user_id).await?;
    Ok(Json(InboxResponse {
        notifications: notifications.iter().map(NotificationResponse::from).collect(),
        unread_count,
    }))
}

/// Mark one notification read
#[utoipa::path(
    patch,
    path = "/{id}/read",
    tag = "notifications",
    operation_id = "patchNotificationRead",
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Marked read", body = SuccessResponse),
        (status = 404, description = "Notification not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn mark_read(
    State(state): State<NotificationsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, PlatformError> {
    if !state.repo.mark_read(&auth.user_id, &id).await? {
        return Err(PlatformError::not_found("Notification", &id));
    }
    Ok(Json(SuccessResponse::ok()))
}

/// Mark the whole inbox read
#[utoipa::path(
    post,
    path = "/read-all",
    tag = "notifications",
    operation_id = "postNotificationsReadAll",
    responses((status = 200, description = "Entries marked read", body = ReadAllResponse)),
    security(("bearer_auth" = []))
)]
pub async fn mark_all_read(
    State(state): State<NotificationsState>,
    auth: Authenticated,
) -> Result<Json<ReadAllResponse>, PlatformError> {
    let updated = state.repo.mark_all_read(&auth.user_id).await?;
    Ok(Json(ReadAllResponse { updated }))
}

/// Delete a notification
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "notifications",
    operation_id = "deleteNotificationById",
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification deleted", body = SuccessResponse),
        (status = 404, description = "Notification not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_notification(
    State(state): State<NotificationsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, PlatformError> {
    if !state.repo.delete(&auth.user_id, &id).await? {
        return Err(PlatformError::not_found("Notification", &id));
    }
    Ok(Json(SuccessResponse::ok()))
}

pub fn notifications_router(state: NotificationsState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_notifications))
        .routes(routes!(mark_all_read))
        .routes(routes!(mark_read))
        .routes(routes!(delete_notification))
        .with_state(state)
}

/// Upgrade to a WebSocket subscribed to the caller's room.
///
/// The token is checked before the upgrade; a bad token gets a plain 401.
pub async fn notifications_socket(
    State(state): State<NotificationsState>,
    Query(query): Query<SocketQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, PlatformError> {
    let caller = state.auth.authenticate(&query.token).await?;
    let receiver = state.hub.subscribe(&caller.user_id);
    info!(room = %room_name(&caller.user_id), "Notification socket opened");

    Ok(ws.on_upgrade(move |socket| stream_room(socket, caller.user_id, receiver)))
}

async fn stream_room(
    socket: WebSocket,
    user_id: String,
    mut room: broadcast::Receiver<NotificationResponse>,
) {
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            pushed = room.recv() => match pushed {
                Ok(notification) => {
                    let text = match serde_json::to_string(&notification) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode notification");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(user_id = %user_id, missed, "Notification socket lagging, entries skipped");
                }
                Err(RecvError::Closed) => break,
            },
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(user_id = %user_id, "Notification socket closed");
}

/// `/ws` lives outside the documented API.
pub fn socket_router(state: NotificationsState) -> Router {
    Router::new()
        .route("/", get(notifications_socket))
        .with_state(state)
}
