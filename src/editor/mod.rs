//! # Editor Module - Draft/Commit Editing Core
//!
//! Everything a student's avatar and room editor needs between the UI and
//! the persistence collaborator.
//!
//! ## Components
//!
//! - [`entity_store`] - Committed/draft pair per entity class
//! - [`history`] - Bounded undo stack of committed snapshots
//! - [`inventory`] - Shared owned-item ledger
//! - [`sync`] - Debounced save state machine
//! - [`permission`] - Edit-rights gate
//! - [`mode`] - Which editor is open, drag state
//! - [`session`] - Composes the above into one editing session
//! - [`driver`] - Background autosave task
//! - [`commands`] - JSON edit scripts for the CLI
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────────┐
//! │  UI / script    │ ← calls EditorSession mutators
//! └─────────────────┘
//!          │  gate → history → draft → trigger
//! ┌─────────────────┐
//! │  EditorSession  │ ← stores, ledger, undo, mode
//! └─────────────────┘
//!          │  debounce elapsed → SaveBatch
//! ┌─────────────────┐
//! │  PersistenceApi │ ← Ack commits, error keeps the draft
//! └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roomkeeper::config::EditorConfig;
//! use roomkeeper::editor::{EditorSession, SystemClock};
//! use roomkeeper::editor::types::EquipSlot;
//! use roomkeeper::storage::MemoryBackend;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = MemoryBackend::new();
//!     let mut session =
//!         EditorSession::load("student-042", &backend, &EditorConfig::default(), Arc::new(SystemClock))
//!             .await?;
//!     session.equip(EquipSlot::Hat, "top_hat_01");
//!     session.flush_now(&backend).await;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod commands;
pub mod driver;
pub mod entity_store;
pub mod errors;
pub mod history;
pub mod inventory;
pub mod mode;
pub mod permission;
pub mod session;
pub mod sync;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity_store::{Entity, EntityStore};
pub use errors::{EditorError, EditorResult};
pub use history::{HistoryEntry, HistoryStack};
pub use inventory::{InventoryLedger, LedgerChange, SharedLedger};
pub use mode::{EditorMode, UIModeController};
pub use permission::PermissionGate;
pub use session::{BatchOutcome, EditorSession, EditorSwitch, SaveBatch};
pub use sync::{CycleReport, SyncCoordinator, SyncEvent, SyncPhase, SyncStatus};
