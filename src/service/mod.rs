// =============================================================================
// Taskhive Planning Backend - Service Container
// =============================================================================
//
// Description:
//   Central container wiring the gatekeeper, read-cursor store, unread
//   counter, fan-out engine and presence registry together. Built once
//   at startup over a storage backend and handed to the API layer as
//   shared state; there is no global singleton to fetch.
//
// =============================================================================

pub mod conversations;
pub mod messages;
pub mod notifications;
pub mod presence;
pub mod read_marker;
pub mod unread;

use std::sync::Arc;

use tracing::info;

/// All services, built in dependency order (presence first, the
/// message pipeline last).
pub struct Services {
    pub presence: Arc<presence::Service>,
    pub notifications: Arc<notifications::Service>,
    pub conversations: Arc<conversations::Service>,
    pub markers: Arc<read_marker::Service>,
    pub unread: Arc<unread::Service>,
    pub messages: Arc<messages::Service>,
}

impl Services {
    pub fn build<D>(db: Arc<D>) -> Self
    where
        D: conversations::Data
            + messages::Data
            + read_marker::Data
            + notifications::Data
            + 'static,
    {
        let presence = Arc::new(presence::Service::new());
        let notifications = Arc::new(notifications::Service::new(
            db.clone(),
            presence.clone(),
        ));
        let conversations = Arc::new(conversations::Service::new(
            db.clone(),
            notifications.clone(),
        ));
        let markers = Arc::new(read_marker::Service::new(db.clone()));
        let unread = Arc::new(unread::Service::new(db.clone(), db.clone(), db.clone()));
        let messages = Arc::new(messages::Service::new(
            db.clone(),
            conversations.clone(),
            markers.clone(),
            notifications.clone(),
            presence.clone(),
        ));

        info!("services initialized");
        Self {
            presence,
            notifications,
            conversations,
            markers,
            unread,
            messages,
        }
    }
}
