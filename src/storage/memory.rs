use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{BackendError, PersistenceApi};
use crate::editor::types::{
    Ack, AvatarPayload, InventoryItem, RoomPayload, ServerSnapshot,
};

#[derive(Debug, Default)]
struct MemoryState {
    snapshots: HashMap<String, ServerSnapshot>,
    avatar_saves: Vec<AvatarPayload>,
    room_saves: Vec<RoomPayload>,
    inventory_saves: Vec<Vec<InventoryItem>>,
    fail_remaining: u32,
    fail_message: String,
}

/// In-process backend that records every call.
///
/// `fail_next(n, msg)` makes the next `n` save calls fail with
/// `BackendError::Rejected(msg)`; `with_latency` delays every save through
/// `tokio::time::sleep` so in-flight windows can be observed.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(handle: &str, snapshot: ServerSnapshot) -> Self {
        let backend = Self::new();
        backend.insert(handle, snapshot);
        backend
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, handle: &str, snapshot: ServerSnapshot) {
        self.state().snapshots.insert(handle.to_string(), snapshot);
    }

    pub fn stored(&self, handle: &str) -> Option<ServerSnapshot> {
        self.state().snapshots.get(handle).cloned()
    }

    pub fn fail_next(&self, count: u32, message: &str) {
        let mut state = self.state();
        state.fail_remaining = count;
        state.fail_message = message.to_string();
    }

    pub fn avatar_saves(&self) -> Vec<AvatarPayload> {
        self.state().avatar_saves.clone()
    }

    pub fn room_saves(&self) -> Vec<RoomPayload> {
        self.state().room_saves.clone()
    }

    pub fn inventory_saves(&self) -> Vec<Vec<InventoryItem>> {
        self.state().inventory_saves.clone()
    }

    /// Total avatar + room save requests received (including failed ones).
    pub fn entity_save_count(&self) -> usize {
        let state = self.state();
        state.avatar_saves.len() + state.room_saves.len()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_failure(state: &mut MemoryState) -> Option<BackendError> {
        if state.fail_remaining == 0 {
            return None;
        }
        state.fail_remaining -= 1;
        Some(BackendError::Rejected(state.fail_message.clone()))
    }
}

#[async_trait]
impl PersistenceApi for MemoryBackend {
    async fn fetch_initial_state(&self, handle: &str) -> Result<ServerSnapshot, BackendError> {
        self.stored(handle)
            .ok_or_else(|| BackendError::NotFound(format!("snapshot: {}", handle)))
    }

    async fn save_avatar(&self, handle: &str, payload: &AvatarPayload) -> Result<Ack, BackendError> {
        self.delay().await;
        let mut state = self.state();
        state.avatar_saves.push(payload.clone());
        if let Some(err) = Self::take_failure(&mut state) {
            return Err(err);
        }
        if let Some(snapshot) = state.snapshots.get_mut(handle) {
            snapshot.avatar.equipped = payload.equipped.clone();
            snapshot.avatar.colors = payload.colors.clone();
        }
        Ok(Ack { saved_at: Utc::now() })
    }

    async fn save_room(&self, handle: &str, payload: &RoomPayload) -> Result<Ack, BackendError> {
        self.delay().await;
        let mut state = self.state();
        state.room_saves.push(payload.clone());
        if let Some(err) = Self::take_failure(&mut state) {
            return Err(err);
        }
        if let Some(snapshot) = state.snapshots.get_mut(handle) {
            snapshot.room.theme = payload.theme;
            snapshot.room.wall = payload.wall.clone();
            snapshot.room.floor = payload.floor.clone();
            snapshot.room.placed_items = payload.placed_items.clone();
        }
        Ok(Ack { saved_at: Utc::now() })
    }

    async fn save_inventory(&self, handle: &str, items: &[InventoryItem]) -> Result<Ack, BackendError> {
        self.delay().await;
        let mut state = self.state();
        state.inventory_saves.push(items.to_vec());
        if let Some(err) = Self::take_failure(&mut state) {
            return Err(err);
        }
        if let Some(snapshot) = state.snapshots.get_mut(handle) {
            snapshot.inventory = items.to_vec();
        }
        Ok(Ack { saved_at: Utc::now() })
    }
}
