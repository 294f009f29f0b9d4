//! Common types for the Taskhive planning backend.
//!
//! This crate holds everything the service crates agree on: typed ids,
//! the conversation/message/notification domain model, and the error
//! taxonomy shared between the services and the API layer.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    Conversation, ConversationId, ConversationKind, ConversationStatus, Member, Message,
    MessageId, Notification, NotificationId, NotificationKind, Role, UserId,
};
