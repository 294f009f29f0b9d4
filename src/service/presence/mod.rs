// =============================================================================
// Taskhive Planning Backend - Presence Registry
// =============================================================================
//
// Description:
//   In-memory routing table from users and conversations to live
//   realtime connections. Purely ephemeral: rebuilt from zero on
//   restart, no replay buffer, no durability. The registry holds
//   connection routing only, never message content or unread counts.
//
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, instrument};
use uuid::Uuid;

use taskhive_common::{ConversationId, Error, Message, Notification, Result, UserId};

/// Ephemeral handle for one realtime connection.
pub type ConnectionId = Uuid;

/// A realtime delivery grouping key.
///
/// `User` rooms receive targeted pushes (notifications); `Conversation`
/// rooms receive broadcasts for everyone currently viewing a thread
/// (live messages, typing indicators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoomId {
    User(UserId),
    Conversation(ConversationId),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::User(id) => write!(f, "user:{id}"),
            RoomId::Conversation(id) => write!(f, "conversation:{id}"),
        }
    }
}

impl FromStr for RoomId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(id) = s.strip_prefix("user:") {
            return Ok(RoomId::User(id.parse()?));
        }
        if let Some(id) = s.strip_prefix("conversation:") {
            return Ok(RoomId::Conversation(id.parse()?));
        }
        Err(Error::InvalidArgument(format!("malformed room id: {s}")))
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Events pushed from the server to subscribed connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Reply to a successful `identify`
    Identified { user_id: UserId },
    /// A message was created in a conversation the connection watches
    NewMessage {
        conversation_id: ConversationId,
        message: Message,
    },
    /// Targeted push to the recipient's user room
    Notification { notification: Notification },
    Typing { room_id: RoomId, user_id: UserId },
    StopTyping { room_id: RoomId, user_id: UserId },
}

#[derive(Debug)]
struct Connection {
    sender: mpsc::UnboundedSender<ServerEvent>,
    user_id: Option<UserId>,
    rooms: BTreeSet<RoomId>,
}

/// Both maps live behind one lock so a disconnect drops every
/// membership atomically, with no window where a room still points at
/// a dead connection.
#[derive(Debug, Default)]
struct Rooms {
    connections: BTreeMap<ConnectionId, Connection>,
    rooms: BTreeMap<RoomId, BTreeSet<ConnectionId>>,
}

#[derive(Debug, Default)]
pub struct Service {
    state: RwLock<Rooms>,
}

impl Service {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh connection with no room memberships.
    pub async fn connect(&self, conn_id: ConnectionId, sender: mpsc::UnboundedSender<ServerEvent>) {
        let mut state = self.state.write().await;
        state.connections.insert(
            conn_id,
            Connection {
                sender,
                user_id: None,
                rooms: BTreeSet::new(),
            },
        );
        debug!(%conn_id, "realtime connection registered");
    }

    /// Binds a connection to a user identity and joins its user room.
    ///
    /// Idempotent; targeted pushes only reach the connection after
    /// this has been called.
    #[instrument(skip(self))]
    pub async fn identify(&self, conn_id: ConnectionId, user_id: UserId) -> Result<()> {
        let mut state = self.state.write().await;
        let connection = state
            .connections
            .get_mut(&conn_id)
            .ok_or_else(|| Error::NotFound(format!("connection {conn_id}")))?;
        connection.user_id = Some(user_id);
        drop(state);
        self.join_room(conn_id, RoomId::User(user_id)).await
    }

    /// Subscribes the connection to an arbitrary room.
    pub async fn join_room(&self, conn_id: ConnectionId, room_id: RoomId) -> Result<()> {
        let mut state = self.state.write().await;
        let connection = state
            .connections
            .get_mut(&conn_id)
            .ok_or_else(|| Error::NotFound(format!("connection {conn_id}")))?;
        connection.rooms.insert(room_id);
        state.rooms.entry(room_id).or_default().insert(conn_id);
        Ok(())
    }

    pub async fn leave_room(&self, conn_id: ConnectionId, room_id: RoomId) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(connection) = state.connections.get_mut(&conn_id) {
            connection.rooms.remove(&room_id);
        }
        if let Some(members) = state.rooms.get_mut(&room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                state.rooms.remove(&room_id);
            }
        }
        Ok(())
    }

    /// Drops the connection and every room membership it held.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let mut state = self.state.write().await;
        let Some(connection) = state.connections.remove(&conn_id) else {
            return;
        };
        for room_id in connection.rooms {
            if let Some(members) = state.rooms.get_mut(&room_id) {
                members.remove(&conn_id);
                if members.is_empty() {
                    state.rooms.remove(&room_id);
                }
            }
        }
        debug!(%conn_id, "realtime connection dropped");
    }

    /// Fire-and-forget broadcast to every connection in the room.
    ///
    /// No acknowledgment, no retry: if nobody is subscribed the event
    /// is silently dropped. Senders to closed connections are skipped;
    /// the read loop cleans them up on disconnect.
    pub async fn emit_to_room(&self, room_id: RoomId, event: ServerEvent) {
        self.emit_filtered(room_id, event, None).await
    }

    /// Broadcast excluding one connection, used so a typing client does
    /// not get its own indicator echoed back.
    pub async fn emit_to_room_except(
        &self,
        room_id: RoomId,
        event: ServerEvent,
        except: ConnectionId,
    ) {
        self.emit_filtered(room_id, event, Some(except)).await
    }

    async fn emit_filtered(&self, room_id: RoomId, event: ServerEvent, except: Option<ConnectionId>) {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(&room_id) else {
            return;
        };
        for conn_id in members {
            if Some(*conn_id) == except {
                continue;
            }
            if let Some(connection) = state.connections.get(conn_id) {
                let _ = connection.sender.send(event.clone());
            }
        }
    }

    /// Direct send to one connection, bypassing rooms (used for the
    /// `identified` reply).
    pub async fn send_to_connection(&self, conn_id: ConnectionId, event: ServerEvent) {
        let state = self.state.read().await;
        if let Some(connection) = state.connections.get(&conn_id) {
            let _ = connection.sender.send(event);
        }
    }

    /// The identity bound to a connection, if `identify` has run.
    pub async fn identity(&self, conn_id: ConnectionId) -> Option<UserId> {
        self.state
            .read()
            .await
            .connections
            .get(&conn_id)
            .and_then(|c| c.user_id)
    }

    pub async fn room_size(&self, room_id: RoomId) -> usize {
        self.state
            .read()
            .await
            .rooms
            .get(&room_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::UnboundedSender<ServerEvent>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test_log::test(tokio::test)]
    async fn test_identify_joins_user_room() {
        let presence = Service::new();
        let conn = Uuid::new_v4();
        let user = UserId::new();
        let (tx, mut rx) = channel();

        presence.connect(conn, tx).await;
        assert_eq!(presence.identity(conn).await, None);

        presence.identify(conn, user).await.unwrap();
        assert_eq!(presence.identity(conn).await, Some(user));
        assert_eq!(presence.room_size(RoomId::User(user)).await, 1);

        // Idempotent
        presence.identify(conn, user).await.unwrap();
        assert_eq!(presence.room_size(RoomId::User(user)).await, 1);

        presence
            .emit_to_room(RoomId::User(user), ServerEvent::Identified { user_id: user })
            .await;
        assert!(matches!(
            rx.recv().await,
            Some(ServerEvent::Identified { .. })
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_identify_unknown_connection() {
        let presence = Service::new();
        let err = presence.identify(Uuid::new_v4(), UserId::new()).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_room_broadcast_excludes_sender() {
        let presence = Service::new();
        let room = RoomId::Conversation(ConversationId::new());
        let typer = UserId::new();

        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        presence.connect(conn_a, tx_a).await;
        presence.connect(conn_b, tx_b).await;
        presence.join_room(conn_a, room).await.unwrap();
        presence.join_room(conn_b, room).await.unwrap();

        presence
            .emit_to_room_except(
                room,
                ServerEvent::Typing {
                    room_id: room,
                    user_id: typer,
                },
                conn_a,
            )
            .await;

        assert!(matches!(rx_b.recv().await, Some(ServerEvent::Typing { .. })));
        assert!(rx_a.try_recv().is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_disconnect_drops_all_memberships() {
        let presence = Service::new();
        let user = UserId::new();
        let room = RoomId::Conversation(ConversationId::new());
        let conn = Uuid::new_v4();
        let (tx, _rx) = channel();

        presence.connect(conn, tx).await;
        presence.identify(conn, user).await.unwrap();
        presence.join_room(conn, room).await.unwrap();

        presence.disconnect(conn).await;
        assert_eq!(presence.room_size(RoomId::User(user)).await, 0);
        assert_eq!(presence.room_size(room).await, 0);
        assert_eq!(presence.identity(conn).await, None);

        // Emitting into the now-empty rooms is a silent no-op.
        presence
            .emit_to_room(room, ServerEvent::StopTyping { room_id: room, user_id: user })
            .await;
    }

    #[test]
    fn test_room_id_round_trip() {
        let room = RoomId::User(UserId::new());
        let parsed: RoomId = room.to_string().parse().unwrap();
        assert_eq!(parsed, room);

        let room = RoomId::Conversation(ConversationId::new());
        let parsed: RoomId = room.to_string().parse().unwrap();
        assert_eq!(parsed, room);

        assert!("kitchen".parse::<RoomId>().is_err());
    }

    #[test]
    fn test_server_event_wire_shape() {
        let user = UserId::new();
        let json = serde_json::to_value(ServerEvent::Identified { user_id: user }).unwrap();
        assert_eq!(json["event"], "identified");

        let room = RoomId::User(user);
        let json = serde_json::to_value(ServerEvent::StopTyping {
            room_id: room,
            user_id: user,
        })
        .unwrap();
        assert_eq!(json["event"], "stop-typing");
        assert_eq!(json["data"]["room_id"], format!("user:{user}"));
    }
}
