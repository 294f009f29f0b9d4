// =============================================================================
// Taskhive Planning Backend - Realtime Endpoint
// =============================================================================
//
// Description:
//   WebSocket session handling. Every event is a JSON envelope
//   {event, data}. A session starts unidentified; after `identify` it
//   receives targeted pushes, and it may join conversation rooms it
//   participates in for live messages and typing indicators. Nothing
//   is replayed on reconnect: a client re-identifies and re-joins, and
//   anything pushed while it was away is only reachable through the
//   notification list.
//
// =============================================================================

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, instrument};
use uuid::Uuid;

use taskhive_common::UserId;

use crate::service::conversations::Access;
use crate::service::presence::{ConnectionId, RoomId, ServerEvent};
use crate::service::Services;

/// Events a client may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Identify { user_id: UserId },
    JoinRoom { room_id: RoomId },
    LeaveRoom { room_id: RoomId },
    Typing { room_id: RoomId, user_id: UserId },
    StopTyping { room_id: RoomId, user_id: UserId },
}

pub async fn realtime(
    State(services): State<Arc<Services>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_session(services, socket))
}

#[instrument(skip(services, socket))]
async fn client_session(services: Arc<Services>, socket: WebSocket) {
    let conn_id: ConnectionId = Uuid::new_v4();
    let (outbound, mut events) = mpsc::unbounded_channel::<ServerEvent>();
    services.presence.connect(conn_id, outbound).await;

    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(incoming)) = stream.next().await {
        let text = match incoming {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            // Pings are answered by axum itself.
            _ => continue,
        };
        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => handle_event(&services, conn_id, event).await,
            Err(e) => debug!(%conn_id, "ignoring malformed client event: {e}"),
        }
    }

    services.presence.disconnect(conn_id).await;
    writer.abort();
    debug!(%conn_id, "realtime session ended");
}

async fn handle_event(services: &Services, conn_id: ConnectionId, event: ClientEvent) {
    match event {
        ClientEvent::Identify { user_id } => {
            if services.presence.identify(conn_id, user_id).await.is_ok() {
                services
                    .presence
                    .send_to_connection(conn_id, ServerEvent::Identified { user_id })
                    .await;
            }
        }
        ClientEvent::JoinRoom { room_id } => {
            if !may_join(services, conn_id, room_id).await {
                debug!(%conn_id, %room_id, "join-room rejected");
                return;
            }
            let _ = services.presence.join_room(conn_id, room_id).await;
        }
        ClientEvent::LeaveRoom { room_id } => {
            let _ = services.presence.leave_room(conn_id, room_id).await;
        }
        ClientEvent::Typing { room_id, user_id } => {
            services
                .presence
                .emit_to_room_except(room_id, ServerEvent::Typing { room_id, user_id }, conn_id)
                .await;
        }
        ClientEvent::StopTyping { room_id, user_id } => {
            services
                .presence
                .emit_to_room_except(
                    room_id,
                    ServerEvent::StopTyping { room_id, user_id },
                    conn_id,
                )
                .await;
        }
    }
}

/// Conversation rooms are participant-only; user rooms belong to the
/// identified user alone (and are normally joined via `identify`).
async fn may_join(services: &Services, conn_id: ConnectionId, room_id: RoomId) -> bool {
    let Some(user_id) = services.presence.identity(conn_id).await else {
        return false;
    };
    match room_id {
        RoomId::User(owner) => owner == user_id,
        RoomId::Conversation(conversation_id) => services
            .conversations
            .authorize(conversation_id, user_id, Access::Read)
            .await
            .is_ok(),
    }
}
