// =============================================================================
// Taskhive Planning Backend - API Layer
// =============================================================================
//
// Description:
//   HTTP surface consumed by the frontend: conversation/message
//   endpoints, unread summaries, the notification list and the
//   websocket upgrade. Identity arrives pre-verified from the gateway
//   in a header; the core trusts it without re-checking credentials.
//
// =============================================================================

pub mod conversations;
pub mod messages;
pub mod notes;
pub mod notifications;
pub mod unread;
pub mod ws;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use taskhive_common::{Error, UserId};

use crate::service::Services;

/// Header carrying the gateway-verified user id.
pub const IDENTITY_HEADER: &str = "x-taskhive-user";

pub fn create_router(services: Arc<Services>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/realtime", get(ws::realtime))
        .route("/conversations", get(conversations::list_mine))
        .route("/conversations/tasks", post(conversations::create_task))
        .route("/conversations/groups", post(conversations::create_group))
        .route("/conversations/:id/archive", post(conversations::archive))
        .route(
            "/conversations/:id/members",
            post(conversations::add_member),
        )
        .route(
            "/conversations/:id/members/:user_id",
            delete(conversations::remove_member).patch(conversations::update_role),
        )
        .route(
            "/conversations/:id/messages",
            post(messages::create).get(messages::list),
        )
        .route("/conversations/:id/read", post(messages::acknowledge))
        .route("/conversations/:id/unread", get(unread::for_conversation))
        .route("/messages/:message_id", patch(messages::update))
        .route("/messages/:message_id/seen", post(messages::mark_seen))
        .route("/unread", get(unread::summary))
        .route("/notifications", get(notifications::list))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/notes/:id/share", post(notes::share))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(services)
}

async fn health() -> &'static str {
    "OK"
}

/// Error wrapper translating the service taxonomy to status codes.
#[derive(Debug)]
pub enum ApiError {
    /// No identity header at all
    Unauthenticated,
    Service(Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "missing identity".to_string())
            }
            ApiError::Service(err) => {
                let status = match &err {
                    Error::NotFound(_) => StatusCode::NOT_FOUND,
                    Error::Forbidden(_) => StatusCode::FORBIDDEN,
                    Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                    Error::Conflict(_) => StatusCode::CONFLICT,
                    Error::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// The requester's identity, resolved by the auth gateway upstream.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(IDENTITY_HEADER)
            .ok_or(ApiError::Unauthenticated)?
            .to_str()
            .map_err(|_| {
                ApiError::Service(Error::InvalidArgument("malformed identity header".into()))
            })?;
        let user_id = raw.parse().map_err(ApiError::Service)?;
        Ok(AuthedUser(user_id))
    }
}

/// Standard page/limit query parameters.
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

pub(crate) fn default_page() -> u64 {
    1
}

pub(crate) fn default_limit() -> u64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let db = Arc::new(MemoryDatabase::new());
        create_router(Arc::new(Services::build(db)))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let app = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/notifications")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_identity_is_bad_request() {
        let app = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/notifications")
                    .header(IDENTITY_HEADER, "not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
