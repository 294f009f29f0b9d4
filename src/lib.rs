// =============================================================================
// Taskhive Planning Backend - Library Root
// =============================================================================
//
// Description:
//   Multi-tenant task planning backend. The interesting part lives in
//   src/service: per-conversation read cursors, lazily computed unread
//   counts, notification fan-out, and the in-memory presence registry
//   that routes realtime pushes to connected sessions.
//
// =============================================================================

pub mod api;
pub mod config;
pub mod database;
pub mod service;

pub use config::Config;
pub use service::Services;
pub use taskhive_common::{Error, Result};
