// =============================================================================
// Taskhive Planning Backend - Note Share Trigger
// =============================================================================
//
// Description:
//   Note CRUD lives in the conventional request/response layer; the
//   only piece the realtime core owns is the share trigger, so the
//   first-share-only notification rule stays in one place (the fan-out
//   engine) no matter which controller edits the share list.
//
// =============================================================================

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use taskhive_common::UserId;

use crate::api::{ApiError, AuthedUser};
use crate::service::notifications::Trigger;
use crate::service::Services;

#[derive(Debug, Deserialize)]
pub struct ShareNoteRequest {
    /// Share list before this edit.
    #[serde(default)]
    pub previous: Vec<UserId>,
    /// Share list after this edit.
    pub shared_with: Vec<UserId>,
}

pub async fn share(
    State(services): State<Arc<Services>>,
    AuthedUser(owner): AuthedUser,
    Path(note_id): Path<Uuid>,
    Json(body): Json<ShareNoteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    services
        .notifications
        .notify(Trigger::NoteShared {
            note: note_id,
            owner,
            previous: body.previous,
            shared_with: body.shared_with,
        })
        .await;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
