//! # Storage Module - Persistence Collaborator
//!
//! The editing core never talks to a database directly. It consumes the
//! [`PersistenceApi`] contract: one fetch to seed a session, then
//! fire-and-forget saves whose only observable output is `Ack` or error.
//!
//! ## Backends
//!
//! - [`SledBackend`] - embedded sled database standing in for the remote
//!   source of truth (used by the CLI)
//! - [`MemoryBackend`] - in-process backend with call recording and failure
//!   injection (used by tests and demos)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roomkeeper::storage::{PersistenceApi, SledBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SledBackend::open("./data/roomkeeper")?;
//!     let snapshot = backend.fetch_initial_state("student-042").await?;
//!     println!("{} placed items", snapshot.room.placed_items.len());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::editor::types::{Ack, AvatarPayload, InventoryItem, RoomPayload, ServerSnapshot};

pub mod kv;
pub mod memory;

pub use kv::SledBackend;
pub use memory::MemoryBackend;

/// Errors returned across the persistence boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No stored state for the requested handle.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Stored record written by an incompatible schema.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// The server refused the write (network failure, validation, etc.).
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Contract between the editing core and whatever persists its state.
#[async_trait]
pub trait PersistenceApi: Send + Sync {
    /// Seed data for a page load: avatar, room, inventory and access flag.
    async fn fetch_initial_state(&self, handle: &str) -> Result<ServerSnapshot, BackendError>;

    async fn save_avatar(&self, handle: &str, payload: &AvatarPayload) -> Result<Ack, BackendError>;

    async fn save_room(&self, handle: &str, payload: &RoomPayload) -> Result<Ack, BackendError>;

    /// Persist the owned-item ledger after placements consumed or returned stock.
    async fn save_inventory(&self, handle: &str, items: &[InventoryItem]) -> Result<Ack, BackendError>;
}
