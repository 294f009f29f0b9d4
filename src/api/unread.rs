// =============================================================================
// Taskhive Planning Backend - Unread Count Endpoints
// =============================================================================

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use taskhive_common::ConversationId;

use crate::api::{ApiError, AuthedUser};
use crate::service::unread::UnreadEntry;
use crate::service::Services;

pub async fn for_conversation(
    State(services): State<Arc<Services>>,
    AuthedUser(user): AuthedUser,
    Path(conversation_id): Path<ConversationId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Only participants may ask for a count.
    services
        .conversations
        .authorize(conversation_id, user, crate::service::conversations::Access::Read)
        .await?;
    let unread = services.unread.count(conversation_id, user).await?;
    Ok(Json(serde_json::json!({ "unread": unread })))
}

/// Batched unread summary for the requester's conversation list.
pub async fn summary(
    State(services): State<Arc<Services>>,
    AuthedUser(user): AuthedUser,
) -> Result<Json<Vec<UnreadEntry>>, ApiError> {
    Ok(Json(services.unread.count_for_user(user).await?))
}
