//! Checkpoint store implementations for Waypoint.
//!
//! Every store keeps exactly one snapshot per conversation and overwrites it
//! on each save, so a crash between two saves loses at most the transition
//! in flight.

pub mod file_store;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file_store::FileCheckpointStore;
pub use in_memory::InMemoryCheckpointStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;
