mod common;

use common::{furniture, session_with_stock, settle, snapshot_with_stock, HANDLE};
use roomkeeper::editor::types::{EntityKind, EquipSlot, InventoryItem};
use roomkeeper::editor::SyncEvent;
use roomkeeper::storage::MemoryBackend;
use tokio::sync::mpsc;

#[tokio::test]
async fn burst_inside_window_sends_one_cumulative_save() {
    let backend = MemoryBackend::new();
    let (mut session, clock) = session_with_stock(true, &[]);

    session.equip(EquipSlot::Hat, "beanie");
    clock.advance_ms(300);
    session.set_colors("#ff8800", "#222222");
    clock.advance_ms(300);
    session.equip(EquipSlot::Glasses, "round_specs");
    clock.advance_ms(300);
    session.equip(EquipSlot::Neck, "bowtie");
    clock.advance_ms(300);
    session.equip(EquipSlot::Held, "wand");

    assert!(session.flush_due(&backend).await.is_none());
    clock.advance_ms(1999);
    assert!(session.flush_due(&backend).await.is_none());
    clock.advance_ms(1);

    let report = session.flush_due(&backend).await.unwrap();
    assert_eq!(report.saved, vec![EntityKind::Avatar]);

    let saves = backend.avatar_saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0], session.avatar().draft().payload());
    assert_eq!(saves[0].equipped.held.as_deref(), Some("wand"));
    assert!(saves[0].colors.as_ref().unwrap().customized);
    assert!(backend.room_saves().is_empty());

    assert!(!session.avatar().is_dirty());
    assert!(session.flush_due(&backend).await.is_none());
}

#[tokio::test]
async fn failed_save_keeps_draft_and_reports_error() {
    let backend = MemoryBackend::new();
    backend.fail_next(1, "network down");
    let (mut session, clock) = session_with_stock(true, &[]);

    session.equip(EquipSlot::Hat, "C");
    let report = settle(&mut session, &clock, &backend).await.unwrap();
    assert!(report.saved.is_empty());
    assert_eq!(report.errors.len(), 1);

    assert_eq!(session.avatar().draft().equipped.hat.as_deref(), Some("C"));
    assert_eq!(session.avatar().committed().equipped.hat, None);
    let status = session.sync_status();
    assert!(status.last_error.unwrap().contains("network down"));
    assert!(!status.is_saving);
    assert!(status.last_saved_at.is_none());

    // No timer-driven retry.
    clock.advance_ms(10_000);
    assert!(session.flush_due(&backend).await.is_none());
    assert!(session.sync_status().last_error.is_none());

    // The next edit re-arms and carries the earlier change too.
    session.set_colors("#010203", "#040506");
    settle(&mut session, &clock, &backend).await.unwrap();
    assert_eq!(session.avatar().committed().equipped.hat.as_deref(), Some("C"));
    assert_eq!(backend.avatar_saves().len(), 2);
    assert!(session.sync_status().last_saved_at.is_some());
}

#[tokio::test]
async fn error_banner_clears_after_five_seconds() {
    let backend = MemoryBackend::new();
    backend.fail_next(1, "timeout");
    let (mut session, clock) = session_with_stock(true, &[]);

    session.set_colors("#abcdef", "#fedcba");
    settle(&mut session, &clock, &backend).await.unwrap();
    assert!(session.sync_status().last_error.is_some());
    clock.advance_ms(4999);
    assert!(session.sync_status().last_error.is_some());
    clock.advance_ms(1);
    assert!(session.sync_status().last_error.is_none());
}

#[tokio::test]
async fn edits_during_flight_schedule_exactly_one_follow_up() {
    let backend = MemoryBackend::new();
    let (mut session, clock) = session_with_stock(true, &[]);

    session.equip(EquipSlot::Hat, "first");
    clock.advance_ms(2000);
    let batch = session.begin_flush().unwrap();
    assert!(session.is_saving());

    session.equip(EquipSlot::Hat, "second");
    session.equip(EquipSlot::Neck, "scarf");
    clock.advance_ms(5000);
    assert!(session.begin_flush().is_none());
    assert!(session.begin_flush_now().is_none());

    let outcome = batch.send(&backend).await;
    let report = session.complete_flush(batch, outcome);
    assert_eq!(report.saved, vec![EntityKind::Avatar]);

    // Only what was sent is committed; the newer edits stay pending.
    assert_eq!(
        session.avatar().committed().equipped.hat.as_deref(),
        Some("first")
    );
    assert!(session.avatar().is_dirty());
    assert!(session.next_deadline().is_some());

    settle(&mut session, &clock, &backend).await.unwrap();
    let saves = backend.avatar_saves();
    assert_eq!(saves.len(), 2);
    assert_eq!(saves[1].equipped.hat.as_deref(), Some("second"));
    assert_eq!(saves[1].equipped.neck.as_deref(), Some("scarf"));
}

#[tokio::test]
async fn undo_during_flight_wins_on_the_server() {
    let backend = MemoryBackend::with_snapshot(HANDLE, snapshot_with_stock(true, &[]));
    let (mut session, clock) = session_with_stock(true, &[]);

    session.equip(EquipSlot::Hat, "A");
    settle(&mut session, &clock, &backend).await.unwrap();

    session.equip(EquipSlot::Hat, "B");
    clock.advance_ms(2000);
    let batch = session.begin_flush().unwrap();
    assert_eq!(session.undo(), Some(EntityKind::Avatar));

    let outcome = batch.send(&backend).await;
    let report = session.complete_flush(batch, outcome);
    assert_eq!(report.stale, vec![EntityKind::Avatar]);
    assert_eq!(session.avatar().committed().equipped.hat.as_deref(), Some("A"));
    assert_eq!(
        backend.stored(HANDLE).unwrap().avatar.equipped.hat.as_deref(),
        Some("B")
    );

    settle(&mut session, &clock, &backend).await.unwrap();
    assert_eq!(
        backend.stored(HANDLE).unwrap().avatar.equipped.hat.as_deref(),
        Some("A")
    );
    assert!(!session.avatar().has_pending_changes());
}

#[tokio::test]
async fn success_invalidates_cached_reads() {
    let backend = MemoryBackend::new();
    let (mut session, clock) = session_with_stock(true, &[]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.set_event_sink(tx);

    session.equip(EquipSlot::Glasses, "monocle");
    settle(&mut session, &clock, &backend).await.unwrap();

    assert_eq!(rx.try_recv().unwrap(), SyncEvent::Invalidate(HANDLE.to_string()));
    assert_eq!(
        rx.try_recv().unwrap(),
        SyncEvent::Saved {
            handle: HANDLE.to_string(),
            entities: vec![EntityKind::Avatar],
        }
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn nothing_to_save_settles_quietly() {
    let backend = MemoryBackend::new();
    let (mut session, clock) = session_with_stock(true, &[]);

    session.equip(EquipSlot::Hat, "beret");
    session.equip(EquipSlot::Hat, "beret");
    assert!(!session.avatar().is_dirty());

    assert!(settle(&mut session, &clock, &backend).await.is_none());
    assert!(backend.avatar_saves().is_empty());
    assert!(session.next_deadline().is_none());
}

#[tokio::test]
async fn acquired_item_is_saved_on_its_own() {
    let backend = MemoryBackend::new();
    let (mut session, clock) = session_with_stock(true, &[]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.set_event_sink(tx);

    session.acquire(InventoryItem::new(furniture("beanbag"), 1));
    assert!(session.next_deadline().is_some());

    let report = settle(&mut session, &clock, &backend).await.unwrap();
    assert!(report.saved.is_empty());
    assert!(report.inventory_saved);
    assert_eq!(backend.inventory_saves().len(), 1);
    assert_eq!(backend.inventory_saves()[0][0].id, "beanbag");

    let status = session.sync_status();
    assert!(status.last_saved_at.is_some());
    assert!(status.last_error.is_none());
    assert_eq!(rx.try_recv().unwrap(), SyncEvent::Invalidate(HANDLE.to_string()));
    assert!(session.flush_due(&backend).await.is_none());
}
