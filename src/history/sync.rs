//! Scan history synchronization service.
//!
//! Owns the observable list of [`HistoryEntry`]s for the authenticated user
//! and at most one live store subscription at a time. The store is the sole
//! source of truth: writes never patch the published list locally, removal
//! and creation only become visible through the next pushed snapshot.

use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ScanError, ScanResult};
use crate::identity::{IdentityProvider, UserId};
use crate::store::{history_namespace, DocumentStore, RecordId, SnapshotReceiver};

use super::models::{HistoryDraft, HistoryEntry};

/// Result of a best-effort [`HistorySynchronizer::clear_history`] pass.
/// Deletes are issued one by one; a non-zero `failed` means the history is
/// partially cleared and the next snapshot will show what survived.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearOutcome {
    pub deleted: usize,
    pub failed: usize,
}

struct ActiveSubscription {
    user_id: UserId,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

/// One instance per process, created at startup and torn down at shutdown.
/// Consumers observe the published list via [`watch_entries`]
/// (`HistorySynchronizer::watch_entries`).
pub struct HistorySynchronizer {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    list_tx: watch::Sender<Vec<HistoryEntry>>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl HistorySynchronizer {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn DocumentStore>) -> Self {
        let (list_tx, _) = watch::channel(Vec::new());
        Self {
            identity,
            store,
            list_tx,
            active: Mutex::new(None),
        }
    }

    /// Latest published list, newest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.list_tx.borrow().clone()
    }

    /// Change channel over the published list.
    pub fn watch_entries(&self) -> watch::Receiver<Vec<HistoryEntry>> {
        self.list_tx.subscribe()
    }

    /// Begin or restart the push subscription for the current identity.
    ///
    /// Idempotent: with no authenticated user this clears the published list
    /// and ensures no subscription is active. While already subscribed, the
    /// prior subscription is torn down first so that at most one listener is
    /// alive at any instant.
    pub async fn subscribe(&self) -> ScanResult<()> {
        let mut active = self.active.lock().await;
        teardown(&mut active).await;

        let Some(user_id) = self.identity.current_identity() else {
            self.list_tx.send_replace(Vec::new());
            info!("no authenticated user; history cleared and unsubscribed");
            return Ok(());
        };

        let receiver = self.store.subscribe(&history_namespace(&user_id)).await?;

        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump_snapshots(
            user_id.clone(),
            receiver,
            self.list_tx.clone(),
            cancel.clone(),
        ));

        info!("history subscription started for user {user_id}");
        *active = Some(ActiveSubscription {
            user_id,
            cancel,
            pump,
        });
        Ok(())
    }

    /// Tear down the active subscription if any. Safe to call repeatedly and
    /// concurrently with an in-flight snapshot delivery: once this returns,
    /// no delivery can mutate the published list.
    pub async fn unsubscribe(&self) {
        let mut active = self.active.lock().await;
        teardown(&mut active).await;
    }

    /// Durably create a history entry for `user_id`.
    ///
    /// Validation happens before any network call: an empty `user_id` or
    /// `text` is `InvalidArgument`, and a `user_id` that does not match the
    /// authenticated identity is `Unauthorized` even if it names a real user.
    /// On success the entry becomes visible only through the next pushed
    /// snapshot; the published list is not touched here.
    pub async fn create(
        &self,
        user_id: &str,
        label: Option<String>,
        text: &str,
    ) -> ScanResult<RecordId> {
        if user_id.is_empty() {
            return Err(ScanError::invalid_argument("user id is empty"));
        }
        if text.trim().is_empty() {
            return Err(ScanError::invalid_argument("analysis text is empty"));
        }

        match self.identity.current_identity() {
            Some(current) if current == user_id => {}
            Some(_) => {
                return Err(ScanError::unauthorized(format!(
                    "user {user_id} is not the signed-in user"
                )))
            }
            None => return Err(ScanError::unauthorized("no signed-in user")),
        }

        let draft = HistoryDraft {
            owner_id: user_id.to_string(),
            label,
            analysis_text: text.to_string(),
        };

        let record_id = self
            .store
            .create(&history_namespace(user_id), draft.into_record()?)
            .await?;
        info!("created history entry {record_id} for user {user_id}");
        Ok(record_id)
    }

    /// Delete one entry from the authenticated user's namespace. The
    /// published list is not patched; removal shows up with the next snapshot
    /// if a subscription is active, otherwise the list stays stale until the
    /// next [`subscribe`](Self::subscribe).
    pub async fn delete(&self, entry_id: &str) -> ScanResult<()> {
        let Some(user_id) = self.identity.current_identity() else {
            return Err(ScanError::unauthorized("no signed-in user"));
        };

        self.store
            .delete(&history_namespace(&user_id), entry_id)
            .await?;
        info!("deleted history entry {entry_id} for user {user_id}");
        Ok(())
    }

    /// Best-effort clear of the user's history: deletes every entry in the
    /// latest published list, one by one. Failed deletes are logged and
    /// counted, never rolled back.
    pub async fn clear_history(&self) -> ScanResult<ClearOutcome> {
        let Some(user_id) = self.identity.current_identity() else {
            return Err(ScanError::unauthorized("no signed-in user"));
        };

        let namespace = history_namespace(&user_id);
        let mut outcome = ClearOutcome::default();
        for entry in self.entries() {
            match self.store.delete(&namespace, &entry.id).await {
                Ok(()) => outcome.deleted += 1,
                Err(err) => {
                    warn!("failed to delete history entry {}: {err}", entry.id);
                    outcome.failed += 1;
                }
            }
        }

        info!(
            "cleared history for user {user_id}: {} deleted, {} failed",
            outcome.deleted, outcome.failed
        );
        Ok(outcome)
    }

    /// Restart the subscription whenever the authenticated identity changes.
    /// Sign-in resubscribes under the new namespace; sign-out clears the list.
    /// The task ends when `cancel` fires or the identity channel closes.
    pub fn spawn_identity_watcher(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let sync = self;
        let mut identity_rx = sync.identity.watch_identity();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("identity watcher shutting down");
                        break;
                    }
                    changed = identity_rx.changed() => {
                        if changed.is_err() {
                            warn!("identity channel closed; identity watcher exiting");
                            break;
                        }
                        let user = identity_rx.borrow_and_update().clone();
                        info!("identity changed to {user:?}; restarting history subscription");
                        if let Err(err) = sync.subscribe().await {
                            error!("failed to restart history subscription: {err}");
                        }
                    }
                }
            }
        })
    }
}

async fn teardown(active: &mut Option<ActiveSubscription>) {
    if let Some(subscription) = active.take() {
        subscription.cancel.cancel();
        if let Err(err) = subscription.pump.await {
            error!("history pump task failed to join: {err}");
        }
        info!(
            "history subscription torn down for user {}",
            subscription.user_id
        );
    }
}

/// Applies pushed snapshots to the published list until cancelled or the
/// stream ends. This task is the single writer of the list while it lives.
async fn pump_snapshots(
    user_id: UserId,
    mut receiver: SnapshotReceiver,
    list_tx: watch::Sender<Vec<HistoryEntry>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("history pump for user {user_id} shutting down");
                break;
            }
            delivery = receiver.recv() => match delivery {
                Some(Ok(snapshot)) => {
                    let total = snapshot.len();
                    let mut entries = Vec::with_capacity(total);
                    for record in &snapshot {
                        match HistoryEntry::decode(record) {
                            Ok(entry) => entries.push(entry),
                            Err(err) => warn!("dropping undecodable history record: {err}"),
                        }
                    }
                    if entries.len() < total {
                        warn!(
                            "published {} of {} history records for user {user_id}",
                            entries.len(),
                            total
                        );
                    }
                    list_tx.send_replace(entries);
                }
                // Stream errors leave the last-known list published; the
                // vendor's reconnect behavior is relied upon.
                Some(Err(err)) => {
                    error!("history subscription stream error for user {user_id}: {err}");
                }
                None => {
                    info!("history subscription stream ended for user {user_id}");
                    break;
                }
            }
        }
    }
}
