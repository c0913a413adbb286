//! Bounded undo history.
//!
//! A ring buffer used as a stack: pushes past capacity evict the oldest
//! entry, pops return the newest.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{EntityKind, EntitySnapshot, MAX_UNDO};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub entity_kind: EntityKind,
    pub timestamp: DateTime<Utc>,
    pub snapshot: EntitySnapshot,
}

impl HistoryEntry {
    pub fn new(snapshot: EntitySnapshot, timestamp: DateTime<Utc>) -> Self {
        Self {
            entity_kind: snapshot.kind(),
            timestamp,
            snapshot,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStack {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(MAX_UNDO)
    }
}

impl HistoryStack {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::types::{AnimalType, Avatar, EquipSlot, Room};

    fn hat_entry(n: usize) -> HistoryEntry {
        let mut avatar = Avatar::new(AnimalType::Cat);
        avatar.equipped.set(EquipSlot::Hat, Some(format!("hat_{n}")));
        HistoryEntry::new(EntitySnapshot::Avatar(avatar), Utc::now())
    }

    fn hat_of(entry: &HistoryEntry) -> String {
        match &entry.snapshot {
            EntitySnapshot::Avatar(a) => a.equipped.hat.clone().unwrap_or_default(),
            EntitySnapshot::Room(_) => panic!("expected avatar entry"),
        }
    }

    #[test]
    fn keeps_only_the_newest_entries() {
        let mut stack = HistoryStack::new(10);
        for n in 0..15 {
            stack.push(hat_entry(n));
        }
        assert_eq!(stack.len(), 10);

        let kept: Vec<String> = stack.iter().map(hat_of).collect();
        let expected: Vec<String> = (5..15).map(|n| format!("hat_{n}")).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn pops_newest_first() {
        let mut stack = HistoryStack::default();
        stack.push(hat_entry(1));
        stack.push(HistoryEntry::new(
            EntitySnapshot::Room(Room::default()),
            Utc::now(),
        ));
        stack.push(hat_entry(3));

        assert_eq!(hat_of(&stack.pop().unwrap()), "hat_3");
        assert_eq!(stack.pop().unwrap().entity_kind, EntityKind::Room);
        assert_eq!(hat_of(&stack.pop().unwrap()), "hat_1");
        assert!(stack.pop().is_none());
        assert!(!stack.can_undo());
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        let mut stack = HistoryStack::new(0);
        stack.push(hat_entry(1));
        stack.push(hat_entry(2));
        assert_eq!(stack.capacity(), 1);
        assert_eq!(hat_of(stack.peek().unwrap()), "hat_2");
    }
}
