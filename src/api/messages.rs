// =============================================================================
// Taskhive Planning Backend - Message Endpoints
// =============================================================================

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use taskhive_common::{ConversationId, Message, MessageId, UserId};

use crate::api::{ApiError, AuthedUser, Pagination};
use crate::service::Services;

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
    #[serde(default)]
    pub is_file: bool,
    #[serde(default)]
    pub mentions: Vec<UserId>,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
}

pub async fn create(
    State(services): State<Arc<Services>>,
    AuthedUser(author): AuthedUser,
    Path(conversation_id): Path<ConversationId>,
    Json(body): Json<CreateMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let message = services
        .messages
        .create(
            conversation_id,
            author,
            body.content,
            body.is_file,
            body.mentions,
            body.reply_to,
        )
        .await?;
    Ok(Json(message))
}

/// Lists a page of messages; fetching the list is an implicit read
/// acknowledgment for the requester.
pub async fn list(
    State(services): State<Arc<Services>>,
    AuthedUser(reader): AuthedUser,
    Path(conversation_id): Path<ConversationId>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = services
        .messages
        .list(conversation_id, reader, pagination.page, pagination.limit)
        .await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<UserId>,
}

pub async fn update(
    State(services): State<Arc<Services>>,
    AuthedUser(actor): AuthedUser,
    Path(message_id): Path<MessageId>,
    Json(body): Json<UpdateMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let message = services
        .messages
        .update(message_id, actor, body.content, body.mentions)
        .await?;
    Ok(Json(message))
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub message_id: MessageId,
}

/// Explicit read acknowledgment up to a specific message.
pub async fn acknowledge(
    State(services): State<Arc<Services>>,
    AuthedUser(reader): AuthedUser,
    Path(conversation_id): Path<ConversationId>,
    Json(body): Json<AcknowledgeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let marker = services
        .messages
        .acknowledge(conversation_id, reader, body.message_id)
        .await?;
    Ok(Json(serde_json::json!({ "last_seen_id": marker })))
}

/// Per-message receipt for group threads.
pub async fn mark_seen(
    State(services): State<Arc<Services>>,
    AuthedUser(user): AuthedUser,
    Path(message_id): Path<MessageId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let newly_seen = services.messages.mark_seen(message_id, user).await?;
    Ok(Json(serde_json::json!({ "newly_seen": newly_seen })))
}
