//! One editing session: both entity stores plus everything that gates,
//! records and persists their changes.
//!
//! Every mutator follows the same sequence: permission check, snapshot the
//! committed value onto the history stack, write the draft, re-arm the save
//! timer. Sessions are explicit values handed to whoever drives them; there
//! is no global store.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use super::clock::Clock;
use super::entity_store::{Entity, EntityStore};
use super::errors::{EditorError, EditorResult};
use super::history::{HistoryEntry, HistoryStack};
use super::inventory::{self, InventoryLedger, LedgerChange, SharedLedger};
use super::mode::{toggle_equip, DragOrigin, DragState, EditorMode, ModeTransition, UIModeController};
use super::permission::PermissionGate;
use super::sync::{CycleReport, SyncCoordinator, SyncEvent, SyncStatus};
use super::types::{
    Ack, Avatar, AvatarColors, EntityKind, EntitySnapshot, EquipSlot, InventoryItem,
    ItemDescriptor, ItemId, PlacedItem, PlacementId, Room, RoomTheme, ServerSnapshot,
    SurfaceConfig,
};
use crate::config::EditorConfig;
use crate::logutil::escape_log;
use crate::storage::{BackendError, PersistenceApi};

/// A value captured for sending, with the store revision it was taken under.
#[derive(Debug, Clone)]
pub struct PendingSave<T> {
    pub value: T,
    pub revision: u64,
}

/// Everything one save request carries.
#[derive(Debug, Clone)]
pub struct SaveBatch {
    pub id: u64,
    pub handle: String,
    pub avatar: Option<PendingSave<Avatar>>,
    pub room: Option<PendingSave<Room>>,
    pub inventory: Option<PendingSave<Vec<InventoryItem>>>,
}

impl SaveBatch {
    pub fn entities(&self) -> Vec<EntityKind> {
        let mut kinds = Vec::new();
        if self.avatar.is_some() {
            kinds.push(EntityKind::Avatar);
        }
        if self.room.is_some() {
            kinds.push(EntityKind::Room);
        }
        kinds
    }

    /// Issue the collaborator calls for every included part. The ledger is
    /// only written once every entity save in the batch succeeded; otherwise
    /// it stays queued with them.
    pub async fn send(&self, backend: &dyn PersistenceApi) -> BatchOutcome {
        let avatar = match &self.avatar {
            Some(pending) => Some(
                backend
                    .save_avatar(&self.handle, &pending.value.payload())
                    .await,
            ),
            None => None,
        };
        let room = match &self.room {
            Some(pending) => Some(backend.save_room(&self.handle, &pending.value.payload()).await),
            None => None,
        };
        let entities_ok =
            !matches!(avatar, Some(Err(_))) && !matches!(room, Some(Err(_)));
        let inventory = match &self.inventory {
            Some(pending) if entities_ok => {
                Some(backend.save_inventory(&self.handle, &pending.value).await)
            }
            _ => None,
        };
        BatchOutcome {
            avatar,
            room,
            inventory,
        }
    }
}

/// Per-part results of a sent batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub avatar: Option<Result<Ack, BackendError>>,
    pub room: Option<Result<Ack, BackendError>>,
    pub inventory: Option<Result<Ack, BackendError>>,
}

/// Result of opening an editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorSwitch {
    pub transition: ModeTransition,
    /// The editor that was left still has unsaved edits; the surface decides
    /// whether to prompt, save or discard.
    pub left_dirty: bool,
}

pub struct EditorSession {
    handle: String,
    avatar: EntityStore<Avatar>,
    room: EntityStore<Room>,
    history: HistoryStack,
    ledger: SharedLedger,
    saved_ledger_revision: u64,
    /// Metadata for every item seen this session, used when returning an
    /// item the ledger no longer lists.
    catalog: HashMap<ItemId, ItemDescriptor>,
    gate: PermissionGate,
    ui: UIModeController,
    sync: SyncCoordinator,
    clock: Arc<dyn Clock>,
    room_item_limit: usize,
    waker: Option<Arc<Notify>>,
}

impl EditorSession {
    pub fn from_snapshot(
        handle: impl Into<String>,
        snapshot: ServerSnapshot,
        config: &EditorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let handle = handle.into();
        let catalog = snapshot
            .inventory
            .iter()
            .map(|item| (item.id.clone(), item.descriptor()))
            .collect();
        let ledger = InventoryLedger::new(snapshot.inventory);
        let saved_ledger_revision = ledger.revision();
        Self {
            avatar: EntityStore::new(snapshot.avatar),
            room: EntityStore::new(snapshot.room),
            history: HistoryStack::new(config.max_undo),
            ledger: inventory::shared(ledger),
            saved_ledger_revision,
            catalog,
            gate: PermissionGate::from_flag(snapshot.permission),
            ui: UIModeController::new(),
            sync: SyncCoordinator::new(handle.clone(), config.debounce(), config.error_clear()),
            clock,
            room_item_limit: config.room_item_limit,
            waker: None,
            handle,
        }
    }

    /// Fetch the initial state through the collaborator and seed a session.
    pub async fn load(
        handle: &str,
        backend: &dyn PersistenceApi,
        config: &EditorConfig,
        clock: Arc<dyn Clock>,
    ) -> EditorResult<Self> {
        let snapshot = backend.fetch_initial_state(handle).await?;
        info!(
            "loaded session for {} (can_edit={})",
            escape_log(handle),
            snapshot.can_edit()
        );
        Ok(Self::from_snapshot(handle, snapshot, config, clock))
    }

    /// Reset everything from a fresh server fetch, dropping unsaved edits and
    /// undo history.
    pub fn initialize(&mut self, snapshot: ServerSnapshot) {
        let can_edit = snapshot.can_edit();
        self.avatar.initialize(&snapshot.avatar);
        self.room.initialize(&snapshot.room);
        self.history.clear();
        for item in &snapshot.inventory {
            self.catalog.insert(item.id.clone(), item.descriptor());
        }
        {
            let mut ledger = inventory::lock(&self.ledger);
            *ledger = InventoryLedger::new(snapshot.inventory);
            self.saved_ledger_revision = ledger.revision();
        }
        self.set_can_edit(can_edit);
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn avatar(&self) -> &EntityStore<Avatar> {
        &self.avatar
    }

    pub fn room(&self) -> &EntityStore<Room> {
        &self.room
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    /// Shared ledger handle; clones see the same stock.
    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    pub fn inventory_items(&self) -> Vec<InventoryItem> {
        inventory::lock(&self.ledger).items().to_vec()
    }

    pub fn quantity(&self, item_id: &str) -> u32 {
        inventory::lock(&self.ledger).quantity(item_id)
    }

    pub fn can_edit(&self) -> bool {
        self.gate.can_edit()
    }

    pub fn mode(&self) -> EditorMode {
        self.ui.mode()
    }

    pub fn dragging(&self) -> Option<&DragState> {
        self.ui.dragging()
    }

    pub fn set_event_sink(&mut self, sink: mpsc::UnboundedSender<SyncEvent>) {
        self.sync.set_event_sink(sink);
    }

    /// Poked whenever the save timer is (re)armed.
    pub fn attach_waker(&mut self, waker: Arc<Notify>) {
        self.waker = Some(waker);
    }

    // ------------------------------------------------------------------
    // Permission and editor mode
    // ------------------------------------------------------------------

    /// Apply a new access-control answer. Revoking edit rights closes any
    /// open editor.
    pub fn set_can_edit(&mut self, can_edit: bool) {
        if self.gate.set(can_edit) && !can_edit {
            if let Some(t) = self.ui.close() {
                info!(
                    target: "security",
                    "edit permission revoked for {}; closed {:?} editor",
                    escape_log(&self.handle),
                    t.from
                );
            }
        }
    }

    pub fn open_editor(&mut self, kind: EntityKind) -> Option<EditorSwitch> {
        let transition = self.ui.open(kind, &self.gate)?;
        let left_dirty = transition
            .left
            .map(|left| self.is_entity_dirty(left))
            .unwrap_or(false);
        Some(EditorSwitch {
            transition,
            left_dirty,
        })
    }

    pub fn close_editor(&mut self) -> Option<EditorSwitch> {
        let transition = self.ui.close()?;
        let left_dirty = transition
            .left
            .map(|left| self.is_entity_dirty(left))
            .unwrap_or(false);
        Some(EditorSwitch {
            transition,
            left_dirty,
        })
    }

    pub fn set_arranging(&mut self, arranging: bool) -> bool {
        if !self.gate.allows("arrange") {
            return false;
        }
        self.ui.set_arranging(arranging)
    }

    /// Dirtiness of whichever entity is being edited; false when closed.
    pub fn is_dirty(&self) -> bool {
        self.ui
            .active_entity()
            .map(|kind| self.is_entity_dirty(kind))
            .unwrap_or(false)
    }

    pub fn is_entity_dirty(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Avatar => self.avatar.is_dirty(),
            EntityKind::Room => self.room.is_dirty(),
        }
    }

    /// Throw away unsaved draft edits for `kind`. Room units placed since
    /// the last commit go back to stock.
    pub fn discard(&mut self, kind: EntityKind) {
        if !self.gate.allows("discard") {
            return;
        }
        match kind {
            EntityKind::Avatar => self.avatar.discard(),
            EntityKind::Room => {
                let committed = self.room.committed().clone();
                self.reconcile_ledger(&committed);
                self.room.discard();
            }
        }
        debug!("discarded {} draft for {}", kind.label(), escape_log(&self.handle));
    }

    // ------------------------------------------------------------------
    // Draft mutation plumbing
    // ------------------------------------------------------------------

    fn record_history<T: Entity>(history: &mut HistoryStack, store: &EntityStore<T>, clock: &dyn Clock) {
        history.push(HistoryEntry::new(store.snapshot_committed(), clock.utc_now()));
    }

    fn mutate_avatar<R>(&mut self, operation: &str, edit: impl FnOnce(&mut Avatar) -> R) -> Option<R> {
        if !self.gate.allows(operation) {
            return None;
        }
        Self::record_history(&mut self.history, &self.avatar, self.clock.as_ref());
        let result = edit(self.avatar.draft_mut());
        self.schedule_sync();
        Some(result)
    }

    fn mutate_room<R>(&mut self, operation: &str, edit: impl FnOnce(&mut Room) -> R) -> Option<R> {
        if !self.gate.allows(operation) {
            return None;
        }
        Self::record_history(&mut self.history, &self.room, self.clock.as_ref());
        let result = edit(self.room.draft_mut());
        self.schedule_sync();
        Some(result)
    }

    fn schedule_sync(&mut self) {
        self.sync.trigger(self.clock.now());
        if let Some(waker) = &self.waker {
            waker.notify_one();
        }
    }

    fn descriptor_for(&self, item_id: &str) -> ItemDescriptor {
        self.catalog
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| ItemDescriptor::placeholder(item_id))
    }

    fn return_to_stock(&self, item_id: &str) -> LedgerChange {
        let fallback = self.descriptor_for(item_id);
        inventory::lock(&self.ledger).increment(item_id, &fallback)
    }

    /// Bring stock in line when the room draft is replaced wholesale: units
    /// placed in the current draft but absent from `target` come back,
    /// units in `target` but not currently placed are taken again.
    fn reconcile_ledger(&self, target: &Room) {
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for placed in &self.room.draft().placed_items {
            *counts.entry(placed.item_id.as_str()).or_default() += 1;
        }
        for placed in &target.placed_items {
            *counts.entry(placed.item_id.as_str()).or_default() -= 1;
        }

        let mut ledger = inventory::lock(&self.ledger);
        for (item_id, delta) in counts {
            if delta > 0 {
                let fallback = self.descriptor_for(item_id);
                for _ in 0..delta {
                    ledger.increment(item_id, &fallback);
                }
            } else {
                for _ in 0..(-delta) {
                    ledger.decrement(item_id);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Avatar editing
    // ------------------------------------------------------------------

    /// Equip `item_id` in `slot`, or take it off if it is already there.
    pub fn equip(&mut self, slot: EquipSlot, item_id: &str) {
        let next = toggle_equip(self.avatar.draft().equipped.get(slot), item_id);
        self.mutate_avatar("equip", |avatar| avatar.equipped.set(slot, next));
    }

    pub fn unequip(&mut self, slot: EquipSlot) {
        if self.avatar.draft().equipped.get(slot).is_none() {
            return;
        }
        self.mutate_avatar("unequip", |avatar| avatar.equipped.set(slot, None));
    }

    pub fn set_colors(&mut self, primary: &str, secondary: &str) {
        let colors = AvatarColors {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            customized: true,
        };
        self.mutate_avatar("set colors", |avatar| avatar.colors = Some(colors));
    }

    /// Back to the animal's default palette.
    pub fn reset_colors(&mut self) {
        self.mutate_avatar("reset colors", |avatar| avatar.colors = None);
    }

    // ------------------------------------------------------------------
    // Room editing
    // ------------------------------------------------------------------

    /// Place one unit of `item_id` from stock. `Ok(None)` means the edit was
    /// not permitted.
    pub fn place_item(&mut self, item_id: &str, x: f32, y: f32) -> EditorResult<Option<PlacementId>> {
        if !self.gate.allows("place item") {
            return Ok(None);
        }
        if self.room.draft().placed_items.len() >= self.room_item_limit {
            return Err(EditorError::CapacityExceeded {
                limit: self.room_item_limit,
            });
        }

        let placed = PlacedItem::new(item_id, x, y);
        let id = placed.id.clone();
        self.mutate_room("place item", |room| room.placed_items.push(placed));
        let change = inventory::lock(&self.ledger).decrement(item_id);
        debug!(
            "placed {} as {} ({:?})",
            escape_log(item_id),
            id,
            change
        );
        Ok(Some(id))
    }

    pub fn move_item(&mut self, placement_id: &str, x: f32, y: f32) -> EditorResult<()> {
        if !self.gate.allows("move item") {
            return Ok(());
        }
        if self.room.draft().find(placement_id).is_none() {
            return Err(EditorError::PlacementNotFound(placement_id.to_string()));
        }
        self.mutate_room("move item", |room| {
            if let Some(placed) = room.find_mut(placement_id) {
                placed.set_position(x, y);
            }
        });
        Ok(())
    }

    pub fn rotate_item(&mut self, placement_id: &str) -> EditorResult<()> {
        if !self.gate.allows("rotate item") {
            return Ok(());
        }
        if self.room.draft().find(placement_id).is_none() {
            return Err(EditorError::PlacementNotFound(placement_id.to_string()));
        }
        self.mutate_room("rotate item", |room| {
            if let Some(placed) = room.find_mut(placement_id) {
                placed.rotate();
            }
        });
        Ok(())
    }

    /// Take a placement off the canvas and return its unit to stock.
    pub fn remove_item(&mut self, placement_id: &str) -> EditorResult<()> {
        if !self.gate.allows("remove item") {
            return Ok(());
        }
        let Some(item_id) = self
            .room
            .draft()
            .find(placement_id)
            .map(|placed| placed.item_id.clone())
        else {
            return Err(EditorError::PlacementNotFound(placement_id.to_string()));
        };
        self.mutate_room("remove item", |room| {
            room.placed_items.retain(|placed| placed.id != placement_id)
        });
        self.return_to_stock(&item_id);
        Ok(())
    }

    /// Remove every placement, returning all units to stock.
    pub fn clear_room(&mut self) -> usize {
        if !self.gate.allows("clear room") {
            return 0;
        }
        if self.room.draft().placed_items.is_empty() {
            return 0;
        }
        let removed = self
            .mutate_room("clear room", |room| std::mem::take(&mut room.placed_items))
            .unwrap_or_default();
        for placed in &removed {
            self.return_to_stock(&placed.item_id);
        }
        info!(
            "cleared {} items from room of {}",
            removed.len(),
            escape_log(&self.handle)
        );
        removed.len()
    }

    pub fn set_theme(&mut self, theme: RoomTheme) {
        self.mutate_room("set theme", |room| room.theme = theme);
    }

    pub fn set_wall(&mut self, wall: SurfaceConfig) {
        self.mutate_room("set wall", |room| room.wall = wall);
    }

    pub fn set_floor(&mut self, floor: SurfaceConfig) {
        self.mutate_room("set floor", |room| room.floor = floor);
    }

    // ------------------------------------------------------------------
    // Placement drag contract
    // ------------------------------------------------------------------

    /// Begin dragging a fresh unit out of the inventory tray.
    pub fn start_placement(&mut self, item: ItemDescriptor) -> bool {
        if !self.gate.allows("start placement") {
            return false;
        }
        self.catalog
            .entry(item.item_id.clone())
            .or_insert_with(|| item.clone());
        self.ui.start_drag(DragState::from_inventory(item));
        true
    }

    /// Begin dragging an existing placement.
    pub fn start_move(&mut self, placement_id: &str) -> EditorResult<bool> {
        if !self.gate.allows("start move") {
            return Ok(false);
        }
        let Some(placed) = self.room.draft().find(placement_id) else {
            return Err(EditorError::PlacementNotFound(placement_id.to_string()));
        };
        let drag = DragState {
            item: self.descriptor_for(&placed.item_id),
            origin: DragOrigin::Placed {
                placement_id: placed.id.clone(),
                original_position: placed.position(),
            },
        };
        self.ui.start_drag(drag);
        Ok(true)
    }

    /// Drop the dragged item at (x, y). The drag is cleared even if the
    /// drop is rejected.
    pub fn complete_placement(&mut self, x: f32, y: f32) -> EditorResult<Option<PlacementId>> {
        let Some(drag) = self.ui.end_drag() else {
            return Ok(None);
        };
        match drag.origin {
            DragOrigin::Inventory => self.place_item(&drag.item.item_id, x, y),
            DragOrigin::Placed { placement_id, .. } => {
                self.move_item(&placement_id, x, y)?;
                Ok(Some(placement_id))
            }
        }
    }

    pub fn cancel_placement(&mut self) -> Option<DragState> {
        self.ui.end_drag()
    }

    // ------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------

    /// Record an item the student just acquired (purchase, reward). It is
    /// persisted with the next save cycle.
    pub fn acquire(&mut self, item: InventoryItem) -> LedgerChange {
        self.catalog.insert(item.id.clone(), item.descriptor());
        let now = self.clock.utc_now();
        let change = inventory::lock(&self.ledger).add(item, now);
        if change != LedgerChange::Unchanged {
            self.schedule_sync();
        }
        change
    }

    // ------------------------------------------------------------------
    // Undo
    // ------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Restore the most recent snapshot into its own entity (committed and
    /// draft) and queue it for saving.
    pub fn undo(&mut self) -> Option<EntityKind> {
        if !self.gate.allows("undo") {
            return None;
        }
        let entry = self.history.pop()?;
        let kind = entry.entity_kind;
        match entry.snapshot {
            EntitySnapshot::Avatar(avatar) => self.avatar.restore(avatar),
            EntitySnapshot::Room(room) => {
                self.reconcile_ledger(&room);
                self.room.restore(room);
            }
        }
        debug!("undo restored {} for {}", kind.label(), escape_log(&self.handle));
        self.schedule_sync();
        Some(kind)
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    pub fn next_deadline(&self) -> Option<Instant> {
        self.sync.deadline()
    }

    pub fn sync_status(&mut self) -> SyncStatus {
        let now = self.clock.now();
        self.sync.status(now)
    }

    pub fn is_saving(&self) -> bool {
        self.sync.is_in_flight()
    }

    /// If the debounce timer has fired, capture a batch of everything that
    /// changed and mark the request in flight.
    pub fn begin_flush(&mut self) -> Option<SaveBatch> {
        if !self.sync.is_due(self.clock.now()) {
            return None;
        }
        self.capture_batch()
    }

    /// Capture a batch immediately, ignoring the debounce timer.
    pub fn begin_flush_now(&mut self) -> Option<SaveBatch> {
        if self.sync.is_in_flight() {
            return None;
        }
        self.capture_batch()
    }

    fn capture_batch(&mut self) -> Option<SaveBatch> {
        let avatar = self.avatar.has_pending_changes().then(|| PendingSave {
            value: self.avatar.draft().clone(),
            revision: self.avatar.revision(),
        });
        let room = self.room.has_pending_changes().then(|| PendingSave {
            value: self.room.draft().clone(),
            revision: self.room.revision(),
        });
        let inventory = {
            let ledger = inventory::lock(&self.ledger);
            if ledger.revision() != self.saved_ledger_revision {
                Some(PendingSave {
                    value: ledger.items().to_vec(),
                    revision: ledger.revision(),
                })
            } else {
                None
            }
        };

        if avatar.is_none() && room.is_none() && inventory.is_none() {
            self.sync.settle_idle();
            return None;
        }

        let id = self.sync.start_request()?;
        let batch = SaveBatch {
            id,
            handle: self.handle.clone(),
            avatar,
            room,
            inventory,
        };
        debug!(
            "flushing batch {} for {}: {:?}",
            batch.id,
            escape_log(&self.handle),
            batch.entities()
        );
        Some(batch)
    }

    /// Apply the collaborator's answers for `batch`. Acknowledged entities
    /// are promoted to exactly the value that was sent; failed ones keep
    /// their draft for the next cycle.
    pub fn complete_flush(&mut self, batch: SaveBatch, outcome: BatchOutcome) -> CycleReport {
        let mut report = CycleReport::default();

        if let (Some(pending), Some(result)) = (batch.avatar, outcome.avatar) {
            Self::settle_entity(&mut self.avatar, pending, result, &mut report);
        }
        if let (Some(pending), Some(result)) = (batch.room, outcome.room) {
            Self::settle_entity(&mut self.room, pending, result, &mut report);
        }
        if let (Some(pending), Some(result)) = (batch.inventory, outcome.inventory) {
            match result {
                Ok(_) => {
                    self.saved_ledger_revision = pending.revision;
                    report.inventory_saved = true;
                }
                Err(e) => report.errors.push(format!("inventory: {e}")),
            }
        }

        let now = self.clock.now();
        let utc_now = self.clock.utc_now();
        self.sync.finish_request(now, utc_now, &report);
        report
    }

    fn settle_entity<T: Entity>(
        store: &mut EntityStore<T>,
        pending: PendingSave<T>,
        result: Result<Ack, BackendError>,
        report: &mut CycleReport,
    ) {
        match result {
            Ok(_) if store.revision() == pending.revision => {
                store.commit_acknowledged(pending.value);
                report.saved.push(T::KIND);
            }
            // An undo replaced committed while this request was out; keep
            // the newer local state queued instead of re-promoting the old.
            Ok(_) => report.stale.push(T::KIND),
            Err(e) => report.errors.push(format!("{}: {}", T::KIND.label(), e)),
        }
    }

    /// Run a save cycle if the debounce timer has fired.
    pub async fn flush_due(&mut self, backend: &dyn PersistenceApi) -> Option<CycleReport> {
        let batch = self.begin_flush()?;
        let outcome = batch.send(backend).await;
        Some(self.complete_flush(batch, outcome))
    }

    /// Save immediately (e.g. before leaving an editor).
    pub async fn flush_now(&mut self, backend: &dyn PersistenceApi) -> Option<CycleReport> {
        let batch = self.begin_flush_now()?;
        let outcome = batch.send(backend).await;
        Some(self.complete_flush(batch, outcome))
    }
}
