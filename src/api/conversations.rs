// =============================================================================
// Taskhive Planning Backend - Conversation Endpoints
// =============================================================================

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use taskhive_common::{Conversation, ConversationId, Role, UserId};

use crate::api::{ApiError, AuthedUser};
use crate::service::Services;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub assignee: UserId,
}

/// Creates a task comment thread; the requester becomes the author.
pub async fn create_task(
    State(services): State<Arc<Services>>,
    AuthedUser(author): AuthedUser,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = services
        .conversations
        .create_task_thread(&body.title, author, body.assignee)
        .await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<UserId>,
}

/// Creates a group chat; the requester becomes the admin member.
pub async fn create_group(
    State(services): State<Arc<Services>>,
    AuthedUser(creator): AuthedUser,
    Json(body): Json<CreateGroupRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = services
        .conversations
        .create_group(&body.name, creator, body.members)
        .await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: UserId,
}

pub async fn add_member(
    State(services): State<Arc<Services>>,
    AuthedUser(actor): AuthedUser,
    Path(conversation_id): Path<ConversationId>,
    Json(body): Json<AddMemberRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = services
        .conversations
        .add_member(conversation_id, actor, body.user_id)
        .await?;
    Ok(Json(conversation))
}

pub async fn remove_member(
    State(services): State<Arc<Services>>,
    AuthedUser(actor): AuthedUser,
    Path((conversation_id, user_id)): Path<(ConversationId, UserId)>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = services
        .conversations
        .remove_member(conversation_id, actor, user_id)
        .await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

pub async fn update_role(
    State(services): State<Arc<Services>>,
    AuthedUser(actor): AuthedUser,
    Path((conversation_id, user_id)): Path<(ConversationId, UserId)>,
    Json(body): Json<UpdateRoleRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = services
        .conversations
        .set_role(conversation_id, actor, user_id, body.role)
        .await?;
    Ok(Json(conversation))
}

pub async fn archive(
    State(services): State<Arc<Services>>,
    AuthedUser(actor): AuthedUser,
    Path(conversation_id): Path<ConversationId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    services.conversations.archive(conversation_id, actor).await?;
    Ok(Json(serde_json::json!({ "status": "archived" })))
}

pub async fn list_mine(
    State(services): State<Arc<Services>>,
    AuthedUser(user): AuthedUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(services.conversations.for_user(user).await?))
}
