// =============================================================================
// Taskhive Planning Backend - Notification Endpoints
// =============================================================================

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use taskhive_common::{Notification, NotificationId};

use crate::api::{ApiError, AuthedUser};
use crate::service::Services;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "crate::api::default_page")]
    pub page: u64,
    #[serde(default = "crate::api::default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub items: Vec<Notification>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

/// Newest-first notification list for the requester.
pub async fn list(
    State(services): State<Arc<Services>>,
    AuthedUser(user): AuthedUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationList>, ApiError> {
    let (items, total) = services
        .notifications
        .list(user, query.page, query.limit, query.unread)
        .await?;
    Ok(Json(NotificationList {
        items,
        total,
        page: query.page,
        limit: query.limit,
    }))
}

pub async fn mark_read(
    State(services): State<Arc<Services>>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<NotificationId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    services.notifications.mark_read(id, user).await?;
    Ok(Json(serde_json::json!({ "status": "read" })))
}
