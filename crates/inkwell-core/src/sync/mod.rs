//! Sync Executor: drains the pending change queue against the content service.
//!
//! Changes are applied one at a time in enqueue order so two writes to the
//! same chapter never race. A content save whose base version is older than
//! the server's is parked as a conflict instead of overwriting server text.

use std::sync::Arc;

use crate::db::LocalStore;
use crate::error::Result;
use crate::models::{
    ChangeStatus, ChangeType, ConflictInfo, PendingChange, SyncStatus, MAX_RETRIES,
};
use crate::remote::ContentService;
use crate::util::now_millis;

/// Result of applying one change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Applied and removed from the queue
    Synced { server_version: Option<i64> },
    /// Server moved ahead; nothing written
    Conflict(ConflictInfo),
    /// Attempt failed; the change stays queued with `attempts` failures recorded
    Failed { message: String, attempts: u32 },
}

/// Summary of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub success_count: usize,
    pub fail_count: usize,
    /// Conflicts detected during this pass
    pub conflicts: Vec<ConflictInfo>,
    /// Resources whose change used its last retry during this pass
    pub exhausted: Vec<String>,
    /// Already exhausted changes that failed again
    pub stalled_count: usize,
    /// Changes left alone because their resource is parked in conflict
    pub blocked_count: usize,
    pub status: SyncStatus,
    /// Completion timestamp (Unix ms)
    pub finished_at: i64,
}

impl SyncReport {
    /// Whether anything was attempted
    pub fn is_empty(&self) -> bool {
        self.success_count == 0
            && self.fail_count == 0
            && self.stalled_count == 0
            && self.conflicts.is_empty()
    }

    fn aggregate_status(&self) -> SyncStatus {
        if !self.conflicts.is_empty() || self.blocked_count > 0 {
            SyncStatus::Conflict
        } else if self.fail_count > 0 || self.stalled_count > 0 {
            SyncStatus::Pending
        } else {
            SyncStatus::Synced
        }
    }
}

/// Applies queued changes through a [`ContentService`]
#[derive(Clone)]
pub struct SyncExecutor {
    service: Arc<dyn ContentService>,
}

impl SyncExecutor {
    pub fn new(service: Arc<dyn ContentService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &dyn ContentService {
        self.service.as_ref()
    }

    /// Run one sync pass over every queued change not parked in conflict.
    ///
    /// Per-change failures are recorded on the change and counted; only
    /// errors reading the queue itself abort the pass. A change is reported
    /// as exhausted once, on the failure that spends its retry budget; later
    /// failures are only counted as stalled.
    pub async fn run(&self, store: &LocalStore) -> Result<SyncReport> {
        let changes = store.pending_changes().await?;
        let mut report = SyncReport::default();

        tracing::info!("Sync pass starting with {} queued change(s)", changes.len());

        for change in changes {
            if store.conflict_for(&change.resource_id).await?.is_some() {
                tracing::debug!(
                    "Skipping change {} for {}: unresolved conflict",
                    change.id,
                    change.resource_id
                );
                report.blocked_count += 1;
                continue;
            }

            let resource_id = change.resource_id.clone();
            match self.sync_change(store, change).await {
                ChangeOutcome::Synced { .. } => report.success_count += 1,
                ChangeOutcome::Conflict(conflict) => report.conflicts.push(conflict),
                ChangeOutcome::Failed { attempts, .. } if attempts > MAX_RETRIES => {
                    report.stalled_count += 1;
                }
                ChangeOutcome::Failed { attempts, .. } => {
                    report.fail_count += 1;
                    if attempts == MAX_RETRIES {
                        report.exhausted.push(resource_id);
                    }
                }
            }
        }

        report.status = report.aggregate_status();
        report.finished_at = now_millis();
        store
            .update_global(report.status, report.finished_at)
            .await?;

        tracing::info!(
            "Sync pass finished: {} synced, {} failed, {} stalled, {} conflict(s), {} blocked",
            report.success_count,
            report.fail_count,
            report.stalled_count,
            report.conflicts.len(),
            report.blocked_count
        );
        Ok(report)
    }

    /// Apply a single change and record its outcome in the store
    pub async fn sync_change(&self, store: &LocalStore, mut change: PendingChange) -> ChangeOutcome {
        change.status = ChangeStatus::Syncing;
        if let Err(error) = store.put(&change).await {
            return Self::record_failure(store, change, &error.to_string()).await;
        }

        let attempt = match change.change_type {
            ChangeType::ContentSave => self.apply_content_save(store, &change).await,
            _ => self.apply_chapter_change(store, &change).await,
        };

        match attempt {
            Ok(outcome @ ChangeOutcome::Conflict(_)) => {
                // Parked: keep it queued for after resolution.
                change.status = ChangeStatus::Pending;
                if let Err(error) = store.put(&change).await {
                    tracing::warn!("Failed to requeue conflicted change {}: {error}", change.id);
                }
                outcome
            }
            Ok(outcome) => outcome,
            Err(error) => Self::record_failure(store, change, &error.to_string()).await,
        }
    }

    async fn apply_content_save(
        &self,
        store: &LocalStore,
        change: &PendingChange,
    ) -> Result<ChangeOutcome> {
        let payload = change.content_payload()?;
        let cached = store.cached_content(&change.resource_id).await?;

        // Content never synced has no base version to conflict with.
        if let Some(cached) = cached.as_ref().filter(|cached| cached.server_version.is_some()) {
            let server = self
                .service
                .get_chapter_content(&change.project_id, &change.resource_id)
                .await?;

            if cached.is_behind(server.version) {
                let conflict = ConflictInfo {
                    resource_id: change.resource_id.clone(),
                    resource_type: change.resource_type,
                    local_content: cached.content.clone(),
                    server_content: server.content,
                    local_version: cached.local_version,
                    server_version: server.version,
                    timestamp: now_millis(),
                };
                tracing::warn!(
                    "Conflict on {}: local base {:?}, server {}",
                    change.resource_id,
                    cached.server_version,
                    server.version
                );
                store.record_conflict(&conflict).await?;
                return Ok(ChangeOutcome::Conflict(conflict));
            }
        }

        let server_version = self
            .service
            .save_chapter_content(&change.project_id, &change.resource_id, &payload.content)
            .await?;

        store
            .mark_synced(change, server_version, payload.local_version)
            .await?;

        tracing::debug!(
            "Saved {} at server version {server_version}",
            change.resource_id
        );
        Ok(ChangeOutcome::Synced {
            server_version: Some(server_version),
        })
    }

    async fn apply_chapter_change(
        &self,
        store: &LocalStore,
        change: &PendingChange,
    ) -> Result<ChangeOutcome> {
        let project_id = change.project_id.as_str();
        let chapter_id = change.resource_id.as_str();

        match change.change_type {
            ChangeType::ChapterCreate => {
                self.service
                    .create_chapter(project_id, chapter_id, &change.payload)
                    .await?;
            }
            ChangeType::ChapterUpdate => {
                self.service
                    .update_chapter(project_id, chapter_id, &change.payload)
                    .await?;
            }
            ChangeType::ChapterDelete => {
                self.service.delete_chapter(project_id, chapter_id).await?;
            }
            ChangeType::ContentSave => return self.apply_content_save(store, change).await,
        }

        store.delete::<PendingChange>(&change.id.as_str()).await?;
        tracing::debug!("Applied {} for {chapter_id}", change.change_type);
        Ok(ChangeOutcome::Synced {
            server_version: None,
        })
    }

    async fn record_failure(
        store: &LocalStore,
        mut change: PendingChange,
        message: &str,
    ) -> ChangeOutcome {
        change.record_failure(message);
        let attempts = change.retry_count;

        if attempts > MAX_RETRIES {
            tracing::debug!(
                "{} for {} still failing after {attempts} attempts: {message}",
                change.change_type,
                change.resource_id
            );
        } else if attempts == MAX_RETRIES {
            tracing::error!(
                "{} for {} failed {} times and is marked failed: {message}",
                change.change_type,
                change.resource_id,
                change.retry_count
            );
        } else {
            tracing::warn!(
                "Sync of {} for {} failed (attempt {}): {message}",
                change.change_type,
                change.resource_id,
                change.retry_count
            );
        }

        if let Err(error) = store.put(&change).await {
            tracing::error!("Failed to record sync failure for {}: {error}", change.id);
        }

        ChangeOutcome::Failed {
            message: message.to_string(),
            attempts,
        }
    }
}
