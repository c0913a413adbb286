//! Test utilities & fixtures.
//! Sessions here run on a [`ManualClock`] so debounce windows are stepped
//! explicitly instead of slept through.
#![allow(dead_code)]

use std::sync::Arc;

use roomkeeper::config::EditorConfig;
use roomkeeper::editor::types::{
    AnimalType, InventoryItem, ItemCategory, ItemDescriptor, Rarity, ServerSnapshot,
};
use roomkeeper::editor::{CycleReport, EditorSession, ManualClock};
use roomkeeper::storage::MemoryBackend;

pub const HANDLE: &str = "student-042";

pub fn furniture(item_id: &str) -> ItemDescriptor {
    ItemDescriptor {
        item_id: item_id.to_string(),
        display_name: item_id.replace('_', " "),
        category: ItemCategory::Furniture,
        unit_cost: 15,
        rarity: Rarity::Common,
    }
}

/// Starter snapshot with counted stock for each `(item_id, quantity)`.
pub fn snapshot_with_stock(can_edit: bool, stock: &[(&str, u32)]) -> ServerSnapshot {
    let mut snapshot = ServerSnapshot::starter(AnimalType::Penguin, can_edit);
    for (id, qty) in stock {
        snapshot
            .inventory
            .push(InventoryItem::new(furniture(id), *qty));
    }
    snapshot
}

pub fn session_from(snapshot: ServerSnapshot) -> (EditorSession, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let session =
        EditorSession::from_snapshot(HANDLE, snapshot, &EditorConfig::default(), clock.clone());
    (session, clock)
}

pub fn session_with_stock(can_edit: bool, stock: &[(&str, u32)]) -> (EditorSession, Arc<ManualClock>) {
    session_from(snapshot_with_stock(can_edit, stock))
}

/// Let the debounce window elapse and run the due save cycle.
pub async fn settle(
    session: &mut EditorSession,
    clock: &ManualClock,
    backend: &MemoryBackend,
) -> Option<CycleReport> {
    clock.advance_ms(EditorConfig::default().debounce_ms);
    session.flush_due(backend).await
}
