//! Process-wide sync counters.
//! Cheap atomics read through [`snapshot`]; nothing here is exported over the wire.
use std::sync::atomic::{AtomicU64, Ordering};

static SAVES_ISSUED: AtomicU64 = AtomicU64::new(0);
static SAVES_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
static SAVES_FAILED: AtomicU64 = AtomicU64::new(0);
static DEBOUNCE_REARMS: AtomicU64 = AtomicU64::new(0);
static DENIED_EDITS: AtomicU64 = AtomicU64::new(0);
static STALE_ACKS: AtomicU64 = AtomicU64::new(0);

pub fn inc_saves_issued() {
    SAVES_ISSUED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_saves_succeeded() {
    SAVES_SUCCEEDED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_saves_failed() {
    SAVES_FAILED.fetch_add(1, Ordering::Relaxed);
}

/// A trigger that landed inside an armed debounce window and reset it.
pub fn inc_debounce_rearms() {
    DEBOUNCE_REARMS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_denied_edits() {
    DENIED_EDITS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_stale_acks() {
    STALE_ACKS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub saves_issued: u64,
    pub saves_succeeded: u64,
    pub saves_failed: u64,
    pub debounce_rearms: u64,
    pub denied_edits: u64,
    pub stale_acks: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        saves_issued: SAVES_ISSUED.load(Ordering::Relaxed),
        saves_succeeded: SAVES_SUCCEEDED.load(Ordering::Relaxed),
        saves_failed: SAVES_FAILED.load(Ordering::Relaxed),
        debounce_rearms: DEBOUNCE_REARMS.load(Ordering::Relaxed),
        denied_edits: DENIED_EDITS.load(Ordering::Relaxed),
        stale_acks: STALE_ACKS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are global and tests run in parallel, so only assert growth.
    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_denied_edits();
        inc_stale_acks();
        let after = snapshot();
        assert!(after.denied_edits > before.denied_edits);
        assert!(after.stale_acks > before.stale_acks);
    }
}
