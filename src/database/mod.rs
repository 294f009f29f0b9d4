// =============================================================================
// Taskhive Planning Backend - Storage Backends
// =============================================================================
//
// Description:
//   Implementations of the per-service Data traits. The in-memory
//   backend serves development and tests; the postgres backend is the
//   production system of record. Both assign message ids from a
//   strictly increasing sequence, which is what makes ids usable as
//   read cursors.
//
// =============================================================================

pub mod memory;
pub mod postgres;

pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;

use crate::service::{conversations, messages, notifications, read_marker};

/// A complete storage backend: everything the service container needs.
pub trait Data:
    conversations::Data + messages::Data + read_marker::Data + notifications::Data
{
}

impl<T> Data for T where
    T: conversations::Data + messages::Data + read_marker::Data + notifications::Data
{
}
