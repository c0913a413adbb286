//! Committed/draft pair for one entity class.
//!
//! The committed value is the last state the server acknowledged; the draft
//! is what the student is looking at. Both are owned values, so a clone is a
//! deep copy and the two can never alias.

use std::fmt::Debug;

use super::types::{Avatar, EntityKind, EntitySnapshot, Room};

/// An entity class that can live in an [`EntityStore`].
pub trait Entity: Clone + PartialEq + Debug {
    const KIND: EntityKind;

    fn into_snapshot(self) -> EntitySnapshot;
}

impl Entity for Avatar {
    const KIND: EntityKind = EntityKind::Avatar;

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::Avatar(self)
    }
}

impl Entity for Room {
    const KIND: EntityKind = EntityKind::Room;

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::Room(self)
    }
}

#[derive(Debug, Clone)]
pub struct EntityStore<T: Entity> {
    committed: T,
    draft: T,
    /// Bumped whenever committed is replaced out-of-band (initialize, undo).
    /// An ack for a request started under an older revision is stale.
    revision: u64,
    /// Set when committed was rewritten locally and the server has not seen it.
    needs_push: bool,
}

impl<T: Entity> EntityStore<T> {
    pub fn new(server_value: T) -> Self {
        Self {
            committed: server_value.clone(),
            draft: server_value,
            revision: 0,
            needs_push: false,
        }
    }

    /// Full reset from a fresh server fetch. Unsaved draft edits are dropped.
    pub fn initialize(&mut self, server_value: &T) {
        self.committed = server_value.clone();
        self.draft = server_value.clone();
        self.revision += 1;
        self.needs_push = false;
    }

    pub fn kind(&self) -> EntityKind {
        T::KIND
    }

    pub fn committed(&self) -> &T {
        &self.committed
    }

    pub fn draft(&self) -> &T {
        &self.draft
    }

    /// Draft write access. Callers own the permission/history/sync sequence.
    pub(crate) fn draft_mut(&mut self) -> &mut T {
        &mut self.draft
    }

    /// Promote the whole draft.
    pub fn commit(&mut self) {
        self.committed = self.draft.clone();
    }

    /// Promote exactly the value the server acknowledged, leaving any newer
    /// draft edits pending.
    pub fn commit_acknowledged(&mut self, acknowledged: T) {
        self.committed = acknowledged;
        self.needs_push = false;
    }

    pub fn discard(&mut self) {
        self.draft = self.committed.clone();
    }

    pub fn is_dirty(&self) -> bool {
        self.committed != self.draft
    }

    /// Replace both halves with an undo snapshot. The server still holds the
    /// newer value, so the store is queued for a push.
    pub fn restore(&mut self, snapshot: T) {
        self.draft = snapshot.clone();
        self.committed = snapshot;
        self.revision += 1;
        self.needs_push = true;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn needs_push(&self) -> bool {
        self.needs_push
    }

    /// True when the next save cycle must include this entity.
    pub fn has_pending_changes(&self) -> bool {
        self.needs_push || self.is_dirty()
    }

    pub fn snapshot_committed(&self) -> EntitySnapshot {
        self.committed.clone().into_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::types::{AnimalType, EquipSlot, PlacedItem};

    #[test]
    fn draft_edits_leave_committed_untouched() {
        let mut store = EntityStore::new(Avatar::new(AnimalType::Owl));
        store
            .draft_mut()
            .equipped
            .set(EquipSlot::Hat, Some("beret".into()));

        assert!(store.is_dirty());
        assert_eq!(store.committed().equipped.hat, None);
        assert_eq!(store.draft().equipped.hat.as_deref(), Some("beret"));

        store.commit();
        assert!(!store.is_dirty());
        assert_eq!(store.committed().equipped.hat.as_deref(), Some("beret"));
    }

    #[test]
    fn discard_reverts_to_committed() {
        let mut store = EntityStore::new(Room::default());
        store
            .draft_mut()
            .placed_items
            .push(PlacedItem::new("plant", 5.0, 5.0));
        store.discard();
        assert!(!store.is_dirty());
        assert!(store.draft().placed_items.is_empty());
    }

    #[test]
    fn initialize_is_a_full_reset() {
        let mut store = EntityStore::new(Avatar::new(AnimalType::Cat));
        store
            .draft_mut()
            .equipped
            .set(EquipSlot::Neck, Some("scarf".into()));
        let before = store.revision();

        let fresh = Avatar::new(AnimalType::Dog);
        store.initialize(&fresh);
        assert_eq!(store.draft(), &fresh);
        assert_eq!(store.committed(), &fresh);
        assert!(store.revision() > before);
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn restore_queues_a_push_even_when_clean() {
        let mut store = EntityStore::new(Avatar::new(AnimalType::Bear));
        store.restore(Avatar::new(AnimalType::Bear));
        assert!(!store.is_dirty());
        assert!(store.needs_push());
        assert!(store.has_pending_changes());

        store.commit_acknowledged(Avatar::new(AnimalType::Bear));
        assert!(!store.has_pending_changes());
    }
}
