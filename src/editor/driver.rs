//! Background autosave task.
//!
//! The task owns no editing state; it sleeps until the session's debounce
//! deadline, then runs one save cycle. The session lock is held only while a
//! batch is captured and while its results are applied, never across the
//! network call, so the student keeps editing while a save is in flight.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

use super::session::EditorSession;
use super::sync::CycleReport;
use crate::storage::PersistenceApi;

pub type SharedSession = Arc<Mutex<EditorSession>>;

enum AutosaveCommand {
    Flush(oneshot::Sender<Option<CycleReport>>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct AutosaveHandle {
    tx: mpsc::UnboundedSender<AutosaveCommand>,
}

impl AutosaveHandle {
    /// Save now regardless of the debounce timer.
    pub async fn flush(&self) -> Option<CycleReport> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(AutosaveCommand::Flush(tx)).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Flush whatever is pending and stop the task.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(AutosaveCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Run one save cycle without holding the session lock across the request.
pub async fn run_cycle(
    session: &SharedSession,
    backend: &dyn PersistenceApi,
    forced: bool,
) -> Option<CycleReport> {
    let batch = {
        let mut guard = session.lock().await;
        if forced {
            guard.begin_flush_now()
        } else {
            guard.begin_flush()
        }
    }?;
    let outcome = batch.send(backend).await;
    let report = session.lock().await.complete_flush(batch, outcome);
    Some(report)
}

pub async fn start_autosave(
    session: SharedSession,
    backend: Arc<dyn PersistenceApi>,
) -> AutosaveHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<AutosaveCommand>();
    let notify = Arc::new(Notify::new());
    session.lock().await.attach_waker(notify.clone());

    tokio::spawn(async move {
        loop {
            let deadline = session.lock().await.next_deadline();
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(AutosaveCommand::Flush(resp)) => {
                        let report = run_cycle(&session, backend.as_ref(), true).await;
                        let _ = resp.send(report);
                    }
                    Some(AutosaveCommand::Shutdown(done)) => {
                        if let Some(report) = run_cycle(&session, backend.as_ref(), true).await {
                            if !report.errors.is_empty() {
                                warn!("final save before shutdown failed: {}", report.errors.join("; "));
                            }
                        }
                        let _ = done.send(());
                        break;
                    }
                    None => break,
                },
                _ = notify.notified() => {}
                _ = timer => {
                    run_cycle(&session, backend.as_ref(), false).await;
                }
            }
        }
        debug!("autosave loop terminated");
    });

    AutosaveHandle { tx }
}
