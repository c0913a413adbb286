//! Owned-item ledger shared by the avatar and room editors.
//!
//! Room placement consumes a unit and returning it restocks one; equipping
//! never touches quantities. Every operation is a single read-modify-write
//! under the ledger lock so the two editors cannot lose each other's updates.
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::debug;

use super::types::{InventoryItem, ItemDescriptor};
use crate::logutil::escape_log;

/// Outcome of a single ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerChange {
    /// One unit taken from stock
    Decremented { remaining: u32 },
    /// The last unit was taken and the entry pruned
    Removed,
    /// One unit added to an existing entry
    Incremented { quantity: u32 },
    /// A new entry was created
    Inserted,
    /// Item not in the ledger; nothing to take
    Missing,
    /// Equip-only item: ownership is boolean, quantity is not tracked
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct InventoryLedger {
    items: Vec<InventoryItem>,
    /// Bumped on every change so the sync layer can tell when to persist.
    revision: u64,
}

impl InventoryLedger {
    /// Build from a server list. Counted entries with zero quantity are pruned.
    pub fn new(items: Vec<InventoryItem>) -> Self {
        let items = items
            .into_iter()
            .filter(|item| !item.stackable || item.quantity > 0)
            .collect();
        Self { items, revision: 0 }
    }

    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    pub fn get(&self, item_id: &str) -> Option<&InventoryItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.get(item_id).is_some()
    }

    pub fn quantity(&self, item_id: &str) -> u32 {
        self.get(item_id).map(|item| item.quantity).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of counted units across all stackable entries.
    pub fn total_units(&self) -> u32 {
        self.items
            .iter()
            .filter(|item| item.stackable)
            .map(|item| item.quantity)
            .sum()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Take one unit out of stock. Absent items are a no-op, not an error:
    /// another path may already have removed the entry.
    pub fn decrement(&mut self, item_id: &str) -> LedgerChange {
        let Some(index) = self.items.iter().position(|item| item.id == item_id) else {
            debug!("ledger decrement of unknown item '{}'", escape_log(item_id));
            return LedgerChange::Missing;
        };

        let item = &mut self.items[index];
        if !item.stackable {
            return LedgerChange::Unchanged;
        }

        let change = if item.quantity > 1 {
            item.quantity -= 1;
            LedgerChange::Decremented {
                remaining: item.quantity,
            }
        } else {
            self.items.remove(index);
            LedgerChange::Removed
        };
        self.revision += 1;
        change
    }

    /// Return one unit to stock, inserting a degraded entry from `fallback`
    /// when the item is not cached.
    pub fn increment(&mut self, item_id: &str, fallback: &ItemDescriptor) -> LedgerChange {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == item_id) {
            if !item.stackable {
                return LedgerChange::Unchanged;
            }
            item.quantity += 1;
            let quantity = item.quantity;
            self.revision += 1;
            return LedgerChange::Incremented { quantity };
        }

        let mut descriptor = fallback.clone();
        descriptor.item_id = item_id.to_string();
        self.items.push(InventoryItem::new(descriptor, 1));
        self.revision += 1;
        LedgerChange::Inserted
    }

    /// Record a newly acquired item, merging into an existing entry.
    pub fn add(&mut self, item: InventoryItem, acquired_at: DateTime<Utc>) -> LedgerChange {
        if let Some(existing) = self.items.iter_mut().find(|e| e.id == item.id) {
            if !existing.stackable {
                return LedgerChange::Unchanged;
            }
            existing.quantity += 1;
            let quantity = existing.quantity;
            self.revision += 1;
            return LedgerChange::Incremented { quantity };
        }

        let mut item = item;
        item.quantity = 1;
        item.acquired_at = Some(acquired_at);
        self.items.push(item);
        self.revision += 1;
        LedgerChange::Inserted
    }
}

/// Ledger handle shared between editors.
pub type SharedLedger = Arc<Mutex<InventoryLedger>>;

pub fn shared(ledger: InventoryLedger) -> SharedLedger {
    Arc::new(Mutex::new(ledger))
}

/// Lock the ledger. Each operation leaves the ledger consistent, so a
/// poisoned lock is safe to reuse.
pub fn lock(ledger: &SharedLedger) -> MutexGuard<'_, InventoryLedger> {
    ledger
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::types::{ItemCategory, Rarity};

    fn desc(id: &str) -> ItemDescriptor {
        ItemDescriptor {
            item_id: id.to_string(),
            display_name: format!("Item {id}"),
            category: ItemCategory::Furniture,
            unit_cost: 15,
            rarity: Rarity::Common,
        }
    }

    fn ledger_with(id: &str, quantity: u32) -> InventoryLedger {
        InventoryLedger::new(vec![InventoryItem::new(desc(id), quantity)])
    }

    #[test]
    fn decrement_then_increment_restores_quantity() {
        let mut ledger = ledger_with("desk", 3);
        assert_eq!(
            ledger.decrement("desk"),
            LedgerChange::Decremented { remaining: 2 }
        );
        assert_eq!(
            ledger.increment("desk", &ItemDescriptor::placeholder("desk")),
            LedgerChange::Incremented { quantity: 3 }
        );
        assert_eq!(ledger.quantity("desk"), 3);
    }

    #[test]
    fn last_unit_prunes_entry() {
        let mut ledger = ledger_with("rug", 1);
        assert_eq!(ledger.decrement("rug"), LedgerChange::Removed);
        assert!(!ledger.contains("rug"));

        // Coming back re-inserts with the caller's descriptor.
        assert_eq!(ledger.increment("rug", &desc("rug")), LedgerChange::Inserted);
        let rug = ledger.get("rug").unwrap();
        assert_eq!(rug.quantity, 1);
        assert_eq!(rug.display_name, "Item rug");
    }

    #[test]
    fn decrement_of_absent_item_is_noop() {
        let mut ledger = InventoryLedger::default();
        let rev = ledger.revision();
        assert_eq!(ledger.decrement("ghost"), LedgerChange::Missing);
        assert_eq!(ledger.revision(), rev);
    }

    #[test]
    fn increment_without_metadata_uses_placeholder() {
        let mut ledger = InventoryLedger::default();
        ledger.increment("mystery_lamp", &ItemDescriptor::placeholder("mystery_lamp"));
        let item = ledger.get("mystery_lamp").unwrap();
        assert_eq!(item.display_name, "mystery_lamp");
        assert_eq!(item.category, ItemCategory::Other);
    }

    #[test]
    fn add_merges_and_stamps_acquisition() {
        let mut ledger = InventoryLedger::default();
        let now = Utc::now();
        assert_eq!(
            ledger.add(InventoryItem::new(desc("lamp"), 9), now),
            LedgerChange::Inserted
        );
        assert_eq!(ledger.quantity("lamp"), 1);
        assert_eq!(ledger.get("lamp").unwrap().acquired_at, Some(now));

        assert_eq!(
            ledger.add(InventoryItem::new(desc("lamp"), 1), now),
            LedgerChange::Incremented { quantity: 2 }
        );
    }

    #[test]
    fn equip_only_items_are_not_counted() {
        let mut ledger = InventoryLedger::new(vec![InventoryItem::equip_only(desc("crown"))]);
        assert_eq!(ledger.decrement("crown"), LedgerChange::Unchanged);
        assert_eq!(
            ledger.increment("crown", &desc("crown")),
            LedgerChange::Unchanged
        );
        assert_eq!(
            ledger.add(InventoryItem::equip_only(desc("crown")), Utc::now()),
            LedgerChange::Unchanged
        );
        assert_eq!(ledger.quantity("crown"), 1);
        assert_eq!(ledger.total_units(), 0);
    }

    #[test]
    fn zero_quantity_entries_are_pruned_on_load() {
        let ledger = InventoryLedger::new(vec![
            InventoryItem::new(desc("a"), 0),
            InventoryItem::new(desc("b"), 2),
        ]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains("b"));
    }

    #[test]
    fn shared_ledger_survives_concurrent_updates() {
        let ledger = shared(ledger_with("block", 1000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        lock(&ledger).decrement("block");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock(&ledger).quantity("block"), 600);
    }
}
