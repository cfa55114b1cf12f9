//! Offline State Controller: the observable face of the sync subsystem.
//!
//! Holds the in-memory [`OfflineState`] projection of the durable store and
//! coordinates local saves, sync passes, and conflict resolution. Front ends
//! subscribe to the state `watch` channel and the notification broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::optimistic::OptimisticUpdate;
use super::state::OfflineState;
use crate::db::{LocalStore, StoreName};
use crate::error::{Error, Result};
use crate::models::{
    CachedContent, ChangeId, ChangeType, ConflictInfo, ConflictResolution, ContentSavePayload,
    Notification, PendingChange, ResourceType, SyncStatus,
};
use crate::remote::ContentService;
use crate::sync::{SyncExecutor, SyncReport};
use crate::util::now_millis;

const NOTIFICATION_CAPACITY: usize = 64;

/// Result of [`OfflineController::save_content`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written straight to the server at this version
    Saved { version: i64 },
    /// Stored locally and queued for the next sync pass
    Queued(ChangeId),
    /// Server moved ahead; the local edit is queued behind the conflict
    Conflict(ConflictInfo),
}

/// Clears the in-flight flag when a sync pass ends, however it ends
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the offline state projection and the operations that change it
pub struct OfflineController {
    store: Arc<LocalStore>,
    pub(super) state: watch::Sender<OfflineState>,
    notifications: broadcast::Sender<Notification>,
    syncing: AtomicBool,
}

impl std::fmt::Debug for OfflineController {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OfflineController")
            .field("state", &*self.state.borrow())
            .field("syncing", &self.syncing.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl OfflineController {
    pub fn new(store: Arc<LocalStore>, is_online: bool) -> Self {
        let (state, _) = watch::channel(OfflineState {
            is_online,
            ..OfflineState::default()
        });
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            store,
            state,
            notifications,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Subscribe to state snapshots
    pub fn subscribe(&self) -> watch::Receiver<OfflineState> {
        self.state.subscribe()
    }

    /// Subscribe to user-facing notifications
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Current state snapshot
    pub fn state(&self) -> OfflineState {
        self.state.borrow().clone()
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().is_online
    }

    pub(super) fn notify(&self, notification: Notification) {
        tracing::debug!("Notification: {} ({})", notification.title, notification.message);
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }

    fn record_error(&self, context: &str, error: &Error) {
        tracing::error!("{context}: {error}");
        let message = format!("{context}: {error}");
        self.state.send_modify(|state| state.sync_error = Some(message));
    }

    /// Load durable state into the projection: conflicts, last sync, and the pending count.
    pub async fn hydrate(&self) -> Result<()> {
        let last_sync_at = self
            .store
            .global_metadata()
            .await?
            .and_then(|metadata| metadata.last_sync_at);
        self.state
            .send_modify(|state| state.last_sync_at = last_sync_at);

        self.restore_conflicts().await?;
        let count = self.refresh_pending_count().await?;
        self.state.send_modify(|state| {
            if state.sync_status == SyncStatus::Synced && count > 0 {
                state.sync_status = SyncStatus::Pending;
            }
        });
        Ok(())
    }

    /// Record a connectivity change.
    ///
    /// Only a real transition notifies; repeating the current value is a no-op.
    pub async fn set_online(&self, is_online: bool) -> Result<()> {
        let changed = self.state.send_if_modified(|state| {
            if state.is_online == is_online {
                return false;
            }
            state.is_online = is_online;
            true
        });
        if !changed {
            return Ok(());
        }

        if is_online {
            tracing::info!("Connection restored");
            self.notify(Notification::success(
                "Back online",
                "Connection restored. Pending changes will sync shortly.",
            ));

            let revived = self.store.reset_failed_changes().await?;
            if revived > 0 {
                tracing::info!("Retrying {revived} failed change(s) after reconnecting");
            }
            let count = self.refresh_pending_count().await?;
            if count > 0 {
                self.state.send_modify(|state| {
                    if state.conflicts.is_empty() {
                        state.sync_status = SyncStatus::Pending;
                    }
                });
            }
        } else {
            tracing::info!("Connection lost, working offline");
            self.notify(Notification::warning(
                "Working offline",
                "Changes are saved locally and will sync when the connection returns.",
            ));
        }
        Ok(())
    }

    /// Recompute the pending count from the durable store
    pub async fn refresh_pending_count(&self) -> Result<usize> {
        let count = self.store.unsynced_count().await?;
        self.state.send_if_modified(|state| {
            let changed = state.pending_changes_count != count;
            state.pending_changes_count = count;
            changed
        });
        Ok(count)
    }

    /// Refresh the pending count whenever the store reports a relevant write.
    ///
    /// The task ends once the controller is dropped.
    pub fn watch_store(self: &Arc<Self>) -> JoinHandle<()> {
        let controller: Weak<Self> = Arc::downgrade(self);
        let mut events = self.store.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.store == StoreName::SyncMetadata => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Store watcher lagged by {skipped} event(s)");
                    }
                    Err(RecvError::Closed) => break,
                }

                let Some(controller) = controller.upgrade() else {
                    break;
                };
                if let Err(error) = controller.refresh_pending_count().await {
                    tracing::warn!("Failed to refresh pending count: {error}");
                }
            }
        })
    }

    // -----------------------------------------------------------------------
    // Local content
    // -----------------------------------------------------------------------

    /// Write a local edit to the cache without queueing it
    pub async fn cache_content(
        &self,
        chapter_id: &str,
        project_id: &str,
        content: &str,
    ) -> Result<CachedContent> {
        let cached = self
            .store
            .cache_content(chapter_id, project_id, content)
            .await?;
        self.refresh_pending_count().await?;
        Ok(cached)
    }

    pub async fn get_cached_content(&self, chapter_id: &str) -> Result<Option<CachedContent>> {
        self.store.cached_content(chapter_id).await
    }

    /// Cache a local edit and queue it for sync as one atomic write
    pub async fn queue_content_save(
        &self,
        chapter_id: &str,
        project_id: &str,
        content: &str,
    ) -> Result<ChangeId> {
        let (cached, change) = self
            .store
            .save_and_enqueue(chapter_id, project_id, content)
            .await?;
        tracing::debug!(
            "Queued content save {} for {chapter_id} (local version {})",
            change.id,
            cached.local_version
        );

        self.refresh_pending_count().await?;
        self.mark_pending();
        Ok(change.id)
    }

    /// Queue a structural chapter change
    pub async fn queue_chapter_change(
        &self,
        change_type: ChangeType,
        resource_type: ResourceType,
        resource_id: &str,
        project_id: &str,
        payload: serde_json::Value,
    ) -> Result<ChangeId> {
        if change_type == ChangeType::ContentSave {
            return Err(Error::InvalidInput(
                "content saves go through queue_content_save".to_string(),
            ));
        }

        let change = PendingChange::new(change_type, resource_type, resource_id, project_id, payload);
        self.store.put(&change).await?;
        tracing::debug!("Queued {change_type} {} for {resource_id}", change.id);

        self.refresh_pending_count().await?;
        self.mark_pending();
        Ok(change.id)
    }

    fn mark_pending(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state.sync_status, SyncStatus::Synced) {
                state.sync_status = SyncStatus::Pending;
                true
            } else {
                false
            }
        });
    }

    /// Save chapter content, directly when online and queued otherwise.
    ///
    /// A network failure while online falls back to the queue with a warning.
    pub async fn save_content(
        &self,
        service: &dyn ContentService,
        chapter_id: &str,
        project_id: &str,
        content: &str,
    ) -> Result<SaveOutcome> {
        if !self.is_online() {
            let id = self
                .queue_content_save(chapter_id, project_id, content)
                .await?;
            return Ok(SaveOutcome::Queued(id));
        }

        match self
            .save_online(service, chapter_id, project_id, content)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(error) if error.is_network() => {
                tracing::warn!("Direct save of {chapter_id} failed, queueing: {error}");
                self.notify(Notification::warning(
                    "Saved offline",
                    "The server could not be reached. Your changes will sync later.",
                ));
                let id = self
                    .queue_content_save(chapter_id, project_id, content)
                    .await?;
                Ok(SaveOutcome::Queued(id))
            }
            Err(error) => {
                self.record_error("Save failed", &error);
                Err(error)
            }
        }
    }

    async fn save_online(
        &self,
        service: &dyn ContentService,
        chapter_id: &str,
        project_id: &str,
        content: &str,
    ) -> Result<SaveOutcome> {
        let previous = self.store.cached_content(chapter_id).await?;

        if let Some(base) = previous.as_ref().and_then(|cached| cached.server_version) {
            let server = service.get_chapter_content(project_id, chapter_id).await?;
            if server.version > base {
                self.queue_content_save(chapter_id, project_id, content)
                    .await?;
                let local_version = self
                    .store
                    .cached_content(chapter_id)
                    .await?
                    .map_or(1, |cached| cached.local_version);

                let conflict = ConflictInfo {
                    resource_id: chapter_id.to_string(),
                    resource_type: ResourceType::Chapter,
                    local_content: content.to_string(),
                    server_content: server.content,
                    local_version,
                    server_version: server.version,
                    timestamp: now_millis(),
                };
                self.store.record_conflict(&conflict).await?;
                self.state.send_modify(|state| {
                    state.upsert_conflict(conflict.clone());
                    state.sync_status = SyncStatus::Conflict;
                });
                tracing::warn!(
                    "Conflict saving {chapter_id}: base {base}, server {}",
                    conflict.server_version
                );
                self.notify(Notification::warning(
                    "Sync conflict",
                    format!("Chapter {chapter_id} was changed elsewhere. Choose which version to keep."),
                ));
                return Ok(SaveOutcome::Conflict(conflict));
            }
        }

        let version = service
            .save_chapter_content(project_id, chapter_id, content)
            .await?;

        // Older queued saves would overwrite what was just written.
        self.store
            .replace_content_saves(chapter_id, |current| {
                let mut cached = CachedContent::local_edit(chapter_id, project_id, content, current);
                cached.server_version = Some(version);
                cached.is_dirty = false;
                Ok((cached, None))
            })
            .await?;
        self.refresh_pending_count().await?;

        tracing::debug!("Saved {chapter_id} directly at server version {version}");
        Ok(SaveOutcome::Saved { version })
    }

    /// Load a chapter, preferring unsynced local edits over server content.
    ///
    /// Returns `None` only when nothing is cached and the server is unreachable.
    pub async fn load_chapter(
        &self,
        service: &dyn ContentService,
        project_id: &str,
        chapter_id: &str,
    ) -> Result<Option<CachedContent>> {
        let cached = self.store.cached_content(chapter_id).await?;
        if !self.is_online() || cached.as_ref().is_some_and(|cached| cached.is_dirty) {
            return Ok(cached);
        }

        match service.get_chapter_content(project_id, chapter_id).await {
            Ok(server) => {
                let snapshot = self
                    .store
                    .cache_server_snapshot(chapter_id, project_id, &server.content, server.version)
                    .await?;
                Ok(Some(snapshot))
            }
            Err(error) if error.is_network() => {
                tracing::warn!("Loading {chapter_id} from cache: {error}");
                Ok(cached)
            }
            Err(error) => Err(error),
        }
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    /// Run one sync pass.
    ///
    /// Returns `None` when offline or when another pass is already running.
    pub async fn sync_pending_changes(
        &self,
        executor: &SyncExecutor,
    ) -> Result<Option<SyncReport>> {
        if !self.is_online() {
            tracing::debug!("Skipping sync pass while offline");
            return Ok(None);
        }
        if self.syncing.swap(true, Ordering::AcqRel) {
            tracing::debug!("Sync pass already running");
            return Ok(None);
        }
        let _guard = SyncGuard(&self.syncing);

        self.state.send_modify(|state| {
            state.is_syncing = true;
            state.sync_status = SyncStatus::Syncing;
            state.sync_error = None;
        });

        let report = match executor.run(&self.store).await {
            Ok(report) => report,
            Err(error) => {
                self.state.send_modify(|state| {
                    state.is_syncing = false;
                    state.sync_status = SyncStatus::Pending;
                });
                self.record_error("Sync failed", &error);
                self.notify(Notification::error("Sync failed", error.to_string()));
                return Err(error);
            }
        };

        let count = match self.refresh_pending_count().await {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!("Keeping previous pending count after sync pass: {error}");
                self.state.borrow().pending_changes_count
            }
        };
        self.state
            .send_modify(|state| state.finish_pass(&report, count));

        if let Some(notification) = summary_notification(&report) {
            self.notify(notification);
        }
        Ok(Some(report))
    }

    /// Give every failed change a fresh retry budget.
    ///
    /// Returns how many changes were reset.
    pub async fn retry_failed_changes(&self) -> Result<usize> {
        let count = self.store.reset_failed_changes().await?;
        if count > 0 {
            tracing::info!("Reset {count} failed change(s) for retry");
            self.mark_pending();
        }
        self.refresh_pending_count().await?;
        Ok(count)
    }

    /// Drop a queued change without syncing it.
    ///
    /// The local text of a discarded content save stays in the cache.
    pub async fn discard_change(&self, id: &ChangeId) -> Result<bool> {
        let Some(change) = self.store.discard_change(&id.as_str()).await? else {
            return Ok(false);
        };
        tracing::info!(
            "Discarded {} {} for {}",
            change.change_type,
            change.id,
            change.resource_id
        );

        self.refresh_pending_count().await?;
        self.state.send_if_modified(|state| {
            if state.is_syncing {
                return false;
            }
            let settled = state.settled_status();
            let changed = state.sync_status != settled;
            state.sync_status = settled;
            changed
        });
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------

    /// Reload unresolved conflicts from the durable store
    pub async fn restore_conflicts(&self) -> Result<usize> {
        let conflicts = self.store.conflicts().await?;
        let count = conflicts.len();
        self.state.send_modify(|state| {
            state.conflicts = conflicts;
            if count > 0 {
                state.sync_status = SyncStatus::Conflict;
            }
        });
        Ok(count)
    }

    /// Resolve a conflict with the chosen strategy.
    ///
    /// Returns `false` when the resource has no conflict. The conflict leaves
    /// the visible list immediately and comes back if resolution fails. Text
    /// that cannot be submitted right now is queued on top of the server
    /// version instead.
    pub async fn resolve_conflict(
        &self,
        service: &dyn ContentService,
        resource_id: &str,
        resolution: ConflictResolution,
    ) -> Result<bool> {
        let known = self.state.borrow().conflict(resource_id).cloned();
        let conflict = match known {
            Some(conflict) => conflict,
            None => match self.store.conflict_for(resource_id).await? {
                Some(conflict) => conflict,
                None => return Ok(false),
            },
        };

        let target = resource_id.to_string();
        let restored = conflict.clone();
        let update = OptimisticUpdate::new(
            move |state: &mut OfflineState| {
                state.conflicts.retain(|conflict| conflict.resource_id != target);
                state.sync_status = state.settled_status();
            },
            move |state: &mut OfflineState| {
                state.upsert_conflict(restored);
                state.sync_status = SyncStatus::Conflict;
            },
        );
        let mut rollback = None;
        self.state
            .send_modify(|state| rollback = Some(update.apply(state)));

        if let Err(error) = self.apply_resolution(service, &conflict, &resolution).await {
            if let Some(rollback) = rollback {
                self.state.send_modify(|state| rollback.rollback(state));
            }
            self.record_error("Conflict resolution failed", &error);
            self.notify(Notification::error(
                "Could not resolve conflict",
                error.to_string(),
            ));
            return Err(error);
        }

        self.refresh_pending_count().await?;
        self.state
            .send_modify(|state| state.sync_status = state.settled_status());
        tracing::info!(
            "Resolved conflict on {resource_id} with {}",
            resolution.strategy()
        );
        self.notify(Notification::success(
            "Conflict resolved",
            format!("{resource_id} resolved with {}.", resolution.strategy()),
        ));
        Ok(true)
    }

    async fn apply_resolution(
        &self,
        service: &dyn ContentService,
        conflict: &ConflictInfo,
        resolution: &ConflictResolution,
    ) -> Result<()> {
        let resource_id = conflict.resource_id.as_str();
        let cached = self.store.cached_content(resource_id).await?;
        let project_id = match cached.as_ref() {
            Some(cached) => cached.project_id.clone(),
            None => self
                .store
                .pending_for_resource(resource_id)
                .await?
                .into_iter()
                .next()
                .map(|change| change.project_id)
                .ok_or_else(|| Error::NotFound(format!("project for {resource_id}")))?,
        };
        let text = resolution.resolved_text(conflict);

        if !resolution.submits() {
            self.store
                .replace_content_saves(resource_id, |current| {
                    Ok((
                        CachedContent::server_snapshot(
                            resource_id,
                            &project_id,
                            text,
                            conflict.server_version,
                            current,
                        ),
                        None,
                    ))
                })
                .await?;
            return self
                .store
                .clear_conflict(resource_id, SyncStatus::Synced, now_millis())
                .await;
        }

        let saved = if self.is_online() {
            match service
                .save_chapter_content(&project_id, resource_id, text)
                .await
            {
                Ok(version) => Some(version),
                Err(error) if error.is_network() => {
                    tracing::warn!("Queueing resolved text for {resource_id}: {error}");
                    None
                }
                Err(error) => return Err(error),
            }
        } else {
            None
        };

        if let Some(version) = saved {
            self.store
                .replace_content_saves(resource_id, |current| {
                    Ok((
                        CachedContent::server_snapshot(resource_id, &project_id, text, version, current),
                        None,
                    ))
                })
                .await?;
            return self
                .store
                .clear_conflict(resource_id, SyncStatus::Synced, now_millis())
                .await;
        }

        // Rebase on the server version so the next pass saves without conflicting.
        self.store
            .replace_content_saves(resource_id, |current| {
                let mut rebased = CachedContent::local_edit(resource_id, &project_id, text, current);
                rebased.server_version = Some(conflict.server_version);
                let change = PendingChange::content_save(
                    resource_id,
                    &project_id,
                    &ContentSavePayload {
                        content: text.to_string(),
                        local_version: rebased.local_version,
                    },
                )?;
                Ok((rebased, Some(change)))
            })
            .await?;
        self.store
            .clear_conflict(resource_id, SyncStatus::Pending, now_millis())
            .await
    }

    /// Hide a conflict without resolving it.
    ///
    /// The queued change stays and is retried by the next pass, which will
    /// detect the conflict again if the server is still ahead.
    pub async fn dismiss_conflict(&self, resource_id: &str) -> Result<bool> {
        let known = self.state.borrow().conflict(resource_id).is_some();
        let stored = self.store.conflict_for(resource_id).await?.is_some();
        if !known && !stored {
            return Ok(false);
        }

        if stored {
            self.store
                .clear_conflict(resource_id, SyncStatus::Pending, now_millis())
                .await?;
        }
        self.state.send_modify(|state| {
            state.conflicts.retain(|conflict| conflict.resource_id != resource_id);
            state.sync_status = state.settled_status();
        });
        tracing::info!("Dismissed conflict on {resource_id}");
        Ok(true)
    }
}

fn summary_notification(report: &SyncReport) -> Option<Notification> {
    if !report.conflicts.is_empty() {
        return Some(Notification::warning(
            "Sync conflicts",
            format!(
                "{} chapter(s) changed elsewhere and need your decision.",
                report.conflicts.len()
            ),
        ));
    }
    if !report.exhausted.is_empty() {
        return Some(Notification::error(
            "Sync failed",
            format!(
                "Could not sync {} after repeated attempts.",
                report.exhausted.join(", ")
            ),
        ));
    }
    if report.fail_count > 0 {
        return Some(Notification::warning(
            "Sync incomplete",
            format!(
                "{} change(s) could not be synced and will be retried.",
                report.fail_count
            ),
        ));
    }
    if report.success_count > 0 {
        return Some(Notification::success(
            "Synced",
            format!("{} change(s) synced.", report.success_count),
        ));
    }
    None
}
