//! # Roomkeeper - Draft/Commit State Sync for Avatar and Room Editors
//!
//! Roomkeeper is the state core behind a classroom's avatar and room editor.
//! Students customise an animal avatar and arrange owned items in a personal
//! room; every edit lands in a local draft first and is persisted to the
//! server after a quiet period.
//!
//! ## Features
//!
//! - **Draft/Commit Stores**: Edits never touch the last acknowledged state until the server confirms them.
//! - **Debounced Saves**: Bursts of edits collapse into one request; only one request is ever in flight.
//! - **Bounded Undo**: The ten most recent committed snapshots, across both editors.
//! - **Shared Inventory**: Placing an item consumes a unit, removing it gives the unit back.
//! - **Permission Gate**: Students without edit rights can look but not change anything.
//! - **Sled Persistence**: An embedded sled database stands in for the remote source of truth.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roomkeeper::config::Config;
//! use roomkeeper::editor::{EditorSession, SystemClock};
//! use roomkeeper::storage::SledBackend;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("roomkeeper.toml").await?;
//!     let backend = SledBackend::open(config.database_path())?;
//!     let mut session =
//!         EditorSession::load("student-042", &backend, &config.editor, Arc::new(SystemClock)).await?;
//!
//!     session.place_item("desk", 40.0, 60.0)?;
//!     session.flush_now(&backend).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`editor`] - Entity stores, undo, inventory ledger, sync coordinator, sessions
//! - [`storage`] - Persistence contract and its sled and in-memory backends
//! - [`config`] - Configuration loading and validation
//! - [`validation`] - Handle, item id and script validation
//! - [`metrics`] - Process-wide save and permission counters
//! - [`logutil`] - Single-line log sanitizing

pub mod config;
pub mod editor;
pub mod logutil;
pub mod metrics;
pub mod storage;
pub mod validation;
