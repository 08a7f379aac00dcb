//! Local-first reconciliation with the remote snapshot.
//!
//! Two layers decide what survives a sync:
//! - the whole document with the larger `updated_at` wins and is written to
//!   both sides;
//! - underneath that, per-exercise progression is merged separately, so a
//!   session recorded only on the losing side is never discarded.
//!
//! A reconciliation is a strict sequence: read remote, merge, push, then
//! commit locally. Local state is only written after the push succeeded.

use crate::remote::RemoteStore;
use crate::snapshot::{self, AppSnapshot};
use crate::store::{KeyValueStore, LocalState};
use crate::{ProgressionMap, Result};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Where the last reconciliation attempt stands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced,
    Pending,
    Offline,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Offline => "offline",
            SyncStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Outcome of one reconciliation attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub message: String,
}

impl SyncReport {
    fn new(status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Merge two progression maps entry by entry
///
/// Every exercise id present on either side survives. When both sides know
/// an exercise, the entry with the larger `last_completed_at` wins; on a tie
/// the local entry is kept.
pub fn merge_progressions(local: &ProgressionMap, remote: &ProgressionMap) -> ProgressionMap {
    let mut merged = remote.clone();
    for (id, local_state) in local {
        let remote_newer = merged
            .get(id)
            .is_some_and(|r| r.last_completed_at > local_state.last_completed_at);
        if !remote_newer {
            merged.insert(id.clone(), local_state.clone());
        }
    }
    merged
}

/// Single pending delayed task; scheduling again restarts the timer
///
/// Only the timer can be cancelled. Once it fires, the task runs on its own
/// and is left to finish even if a new one is scheduled meanwhile.
#[derive(Debug, Default)]
pub struct DebounceScheduler {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceScheduler {
    /// Run `task` after `delay`, cancelling a timer that has not fired yet
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached: aborting the timer from here on leaves it running
            let _ = tokio::spawn(task).await;
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the pending timer, returning whether it had not finished
    pub fn cancel(&self) -> bool {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Reconciles the device's snapshot with the remote copy for one user
pub struct SyncCoordinator<S, R: ?Sized> {
    local: Arc<LocalState<S>>,
    remote: Arc<R>,
    user_id: String,
    debounce: Duration,
    scheduler: DebounceScheduler,
    status: Mutex<SyncStatus>,
}

impl<S, R> SyncCoordinator<S, R>
where
    S: KeyValueStore + 'static,
    R: RemoteStore + ?Sized + 'static,
{
    pub fn new(
        local: Arc<LocalState<S>>,
        remote: Arc<R>,
        user_id: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            user_id: user_id.into(),
            debounce,
            scheduler: DebounceScheduler::default(),
            status: Mutex::new(SyncStatus::Idle),
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn local(&self) -> &LocalState<S> {
        &self.local
    }

    fn set_status(&self, status: SyncStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Run one reconciliation attempt now
    ///
    /// Never fails: problems are reported through the returned status.
    pub async fn reconcile(&self) -> SyncReport {
        let report = if !self.remote.is_configured() {
            SyncReport::new(SyncStatus::Offline, "remote store not configured")
        } else if !self.remote.is_online() {
            SyncReport::new(SyncStatus::Offline, "remote store unreachable")
        } else {
            self.set_status(SyncStatus::Syncing);
            match self.exchange().await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!("Sync for {} failed: {}", self.user_id, e);
                    SyncReport::new(SyncStatus::Error, format!("sync failed: {}", e))
                }
            }
        };

        tracing::info!("Sync {}: {}", report.status, report.message);
        self.set_status(report.status);
        report
    }

    async fn exchange(&self) -> Result<SyncReport> {
        let local = self.local.load()?;
        let remote = self.remote.get_state(&self.user_id).await?;

        let Some(remote) = remote else {
            let merged =
                merge_progressions(&local.progression_by_exercise_id, &ProgressionMap::new());
            return if local.has_history() {
                let document = with_progression(local, merged);
                self.push_and_commit(&document).await?;
                Ok(SyncReport::new(SyncStatus::Synced, "uploaded local data"))
            } else {
                let fresh = AppSnapshot::new_user(snapshot::now_millis());
                let document = with_progression(fresh, merged);
                self.push_and_commit(&document).await?;
                Ok(SyncReport::new(SyncStatus::Synced, "initialized new account"))
            };
        };

        let merged = merge_progressions(
            &local.progression_by_exercise_id,
            &remote.progression_by_exercise_id,
        );
        tracing::debug!(
            "Comparing local updated_at {} with remote {}",
            local.updated_at,
            remote.updated_at
        );

        let (document, message) = if local.updated_at > remote.updated_at {
            (with_progression(local, merged), "pushed local changes")
        } else if remote.updated_at > local.updated_at {
            (with_progression(remote, merged), "pulled remote changes")
        } else {
            (with_progression(local, merged), "already in sync")
        };

        self.push_and_commit(&document).await?;
        Ok(SyncReport::new(SyncStatus::Synced, message))
    }

    async fn push_and_commit(&self, document: &AppSnapshot) -> Result<()> {
        self.remote.set_state(&self.user_id, document).await?;
        self.local.replace(document)
    }

    /// Coalesce a burst of local mutations into one reconciliation
    ///
    /// Each call restarts the debounce window; `on_status` sees `pending`
    /// immediately, then `syncing` and the final status once the window
    /// elapses.
    pub fn schedule_sync<F>(self: &Arc<Self>, on_status: F)
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        self.set_status(SyncStatus::Pending);
        on_status(SyncStatus::Pending);

        let coordinator = Arc::clone(self);
        self.scheduler.schedule(self.debounce, async move {
            on_status(SyncStatus::Syncing);
            let report = coordinator.reconcile().await;
            on_status(report.status);
        });
    }

    /// Cancel any pending debounced sync and reconcile immediately
    pub async fn force_sync(&self) -> SyncReport {
        if self.scheduler.cancel() {
            tracing::debug!("Cancelled pending sync for {}", self.user_id);
        }
        self.reconcile().await
    }

    pub fn has_pending_sync(&self) -> bool {
        self.scheduler.is_pending()
    }
}

fn with_progression(mut document: AppSnapshot, progression: ProgressionMap) -> AppSnapshot {
    document.progression_by_exercise_id = progression;
    document
}
