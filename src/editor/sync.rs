//! Debounced save coordination.
//!
//! Per save cycle the coordinator moves through
//! `Idle -> Pending (timer armed) -> InFlight -> Idle`. The pending timer is
//! a single deadline slot: every trigger re-arms it, so a burst of edits
//! inside the window collapses into one request. Only one request is ever in
//! flight; triggers that arrive meanwhile set `rerun`, which re-arms the
//! timer once the request resolves.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::types::EntityKind;
use crate::logutil::escape_log;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Pending { deadline: Instant },
    InFlight { rerun: bool },
}

/// What a status banner shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub last_saved_at: Option<DateTime<Utc>>,
    pub is_saving: bool,
    pub last_error: Option<String>,
}

/// Signals for layers above the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Cached reads for this identity are stale.
    Invalidate(String),
    Saved {
        handle: String,
        entities: Vec<EntityKind>,
    },
    Failed {
        handle: String,
        message: String,
    },
}

/// Result of one completed request, as seen by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub saved: Vec<EntityKind>,
    pub errors: Vec<String>,
    /// Entities whose ack arrived after an undo replaced the state it covered.
    pub stale: Vec<EntityKind>,
    /// The owned-item ledger was written.
    pub inventory_saved: bool,
}

impl CycleReport {
    /// Something in the batch reached the server.
    pub fn wrote_anything(&self) -> bool {
        !self.saved.is_empty() || self.inventory_saved
    }
}

#[derive(Debug)]
pub struct SyncCoordinator {
    handle: String,
    debounce: Duration,
    error_ttl: Duration,
    phase: SyncPhase,
    last_saved_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    error_expires_at: Option<Instant>,
    next_batch_id: u64,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl SyncCoordinator {
    pub fn new(handle: impl Into<String>, debounce: Duration, error_ttl: Duration) -> Self {
        Self {
            handle: handle.into(),
            debounce,
            error_ttl,
            phase: SyncPhase::Idle,
            last_saved_at: None,
            last_error: None,
            error_expires_at: None,
            next_batch_id: 1,
            events: None,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn set_event_sink(&mut self, sink: mpsc::UnboundedSender<SyncEvent>) {
        self.events = Some(sink);
    }

    /// Arm (or re-arm) the debounce timer. During a request the trigger is
    /// remembered instead, never issuing a second request.
    pub fn trigger(&mut self, now: Instant) {
        match self.phase {
            SyncPhase::Idle => {
                self.phase = SyncPhase::Pending {
                    deadline: now + self.debounce,
                };
                debug!("sync armed for {}", escape_log(&self.handle));
            }
            SyncPhase::Pending { .. } => {
                metrics::inc_debounce_rearms();
                self.phase = SyncPhase::Pending {
                    deadline: now + self.debounce,
                };
            }
            SyncPhase::InFlight { .. } => {
                self.phase = SyncPhase::InFlight { rerun: true };
            }
        }
    }

    /// Armed deadline, if the timer is pending.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            SyncPhase::Pending { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.phase, SyncPhase::Pending { deadline } if deadline <= now)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase, SyncPhase::InFlight { .. })
    }

    /// Move into `InFlight` and hand out a batch id. Returns `None` while a
    /// request is already outstanding.
    pub fn start_request(&mut self) -> Option<u64> {
        if self.is_in_flight() {
            return None;
        }
        self.phase = SyncPhase::InFlight { rerun: false };
        let id = self.next_batch_id;
        self.next_batch_id += 1;
        metrics::inc_saves_issued();
        Some(id)
    }

    /// The timer fired but there was nothing to write.
    pub fn settle_idle(&mut self) {
        if matches!(self.phase, SyncPhase::Pending { .. }) {
            self.phase = SyncPhase::Idle;
        }
    }

    /// Resolve the outstanding request.
    pub fn finish_request(&mut self, now: Instant, utc_now: DateTime<Utc>, report: &CycleReport) {
        let rerun = matches!(self.phase, SyncPhase::InFlight { rerun: true });

        if report.wrote_anything() {
            self.last_saved_at = Some(utc_now);
            metrics::inc_saves_succeeded();
            info!(
                "saved {:?} (inventory: {}) for {}",
                report.saved,
                report.inventory_saved,
                escape_log(&self.handle)
            );
            self.emit(SyncEvent::Invalidate(self.handle.clone()));
            self.emit(SyncEvent::Saved {
                handle: self.handle.clone(),
                entities: report.saved.clone(),
            });
        }

        if report.errors.is_empty() {
            if report.wrote_anything() {
                self.clear_error();
            }
        } else {
            let message = report.errors.join("; ");
            metrics::inc_saves_failed();
            warn!(
                "save failed for {}: {}",
                escape_log(&self.handle),
                escape_log(&message)
            );
            self.last_error = Some(message.clone());
            self.error_expires_at = Some(now + self.error_ttl);
            self.emit(SyncEvent::Failed {
                handle: self.handle.clone(),
                message,
            });
        }

        for kind in &report.stale {
            metrics::inc_stale_acks();
            warn!(
                "stale {} ack for {} ignored; newer local state will be re-sent",
                kind.label(),
                escape_log(&self.handle)
            );
        }

        // Failures are not retried on their own; only a new trigger re-arms.
        self.phase = if rerun {
            SyncPhase::Pending {
                deadline: now + self.debounce,
            }
        } else {
            SyncPhase::Idle
        };
    }

    /// Drop the error once its display window has passed.
    pub fn expire_error(&mut self, now: Instant) {
        if matches!(self.error_expires_at, Some(at) if at <= now) {
            self.clear_error();
        }
    }

    fn clear_error(&mut self) {
        self.last_error = None;
        self.error_expires_at = None;
    }

    pub fn error_expires_at(&self) -> Option<Instant> {
        self.error_expires_at
    }

    pub fn status(&mut self, now: Instant) -> SyncStatus {
        self.expire_error(now);
        SyncStatus {
            last_saved_at: self.last_saved_at,
            is_saving: self.is_in_flight(),
            last_error: self.last_error.clone(),
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver just means nobody is caching.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> SyncCoordinator {
        SyncCoordinator::new("kid", Duration::from_millis(2000), Duration::from_millis(5000))
    }

    #[test]
    fn triggers_inside_window_push_the_deadline_out() {
        let mut sync = coordinator();
        let t0 = Instant::now();
        sync.trigger(t0);
        assert_eq!(sync.deadline(), Some(t0 + Duration::from_millis(2000)));

        sync.trigger(t0 + Duration::from_millis(1500));
        assert!(!sync.is_due(t0 + Duration::from_millis(2500)));
        assert!(sync.is_due(t0 + Duration::from_millis(3500)));
    }

    #[test]
    fn trigger_during_flight_schedules_follow_up() {
        let mut sync = coordinator();
        let t0 = Instant::now();
        sync.trigger(t0);
        assert!(sync.start_request().is_some());
        assert!(sync.start_request().is_none());

        sync.trigger(t0);
        assert_eq!(sync.phase(), SyncPhase::InFlight { rerun: true });

        let report = CycleReport {
            saved: vec![EntityKind::Avatar],
            ..Default::default()
        };
        let done = t0 + Duration::from_millis(100);
        sync.finish_request(done, Utc::now(), &report);
        assert_eq!(sync.deadline(), Some(done + Duration::from_millis(2000)));
    }

    #[test]
    fn failure_sets_error_that_expires() {
        let mut sync = coordinator();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sync.set_event_sink(tx);

        let t0 = Instant::now();
        sync.trigger(t0);
        sync.start_request();
        let report = CycleReport {
            errors: vec!["avatar: offline".into()],
            ..Default::default()
        };
        sync.finish_request(t0, Utc::now(), &report);
        assert_eq!(sync.phase(), SyncPhase::Idle);
        assert_eq!(
            sync.status(t0).last_error.as_deref(),
            Some("avatar: offline")
        );
        assert!(matches!(rx.try_recv(), Ok(SyncEvent::Failed { .. })));

        assert!(sync.status(t0 + Duration::from_millis(4999)).last_error.is_some());
        assert!(sync.status(t0 + Duration::from_millis(5000)).last_error.is_none());
    }

    #[test]
    fn success_emits_invalidation() {
        let mut sync = coordinator();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sync.set_event_sink(tx);
        sync.trigger(Instant::now());
        sync.start_request();
        let report = CycleReport {
            saved: vec![EntityKind::Room],
            ..Default::default()
        };
        sync.finish_request(Instant::now(), Utc::now(), &report);
        assert_eq!(rx.try_recv().unwrap(), SyncEvent::Invalidate("kid".into()));
        assert!(sync.status(Instant::now()).last_saved_at.is_some());
    }

    #[test]
    fn inventory_only_write_counts_as_a_save() {
        let mut sync = coordinator();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sync.set_event_sink(tx);
        sync.trigger(Instant::now());
        sync.start_request();
        let report = CycleReport {
            inventory_saved: true,
            ..Default::default()
        };
        sync.finish_request(Instant::now(), Utc::now(), &report);
        assert_eq!(rx.try_recv().unwrap(), SyncEvent::Invalidate("kid".into()));
        assert!(sync.status(Instant::now()).last_saved_at.is_some());
    }
}
