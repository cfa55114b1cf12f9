//! End-to-end offline editing and sync scenarios against in-process services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use inkwell_core::db::LocalStore;
use inkwell_core::models::{
    ChangeStatus, ChangeType, ConflictResolution, MutationKind, NotificationLevel, QueuedMutation,
    ResourceType, SyncStatus,
};
use inkwell_core::remote::{ContentService, MutationTransport, ServerContent};
use inkwell_core::{Error, OfflineController, Result, SaveOutcome, SyncExecutor};
use pretty_assertions::assert_eq;

/// Versioned chapter server that can be taken offline
#[derive(Default)]
struct FakeServer {
    chapters: Mutex<HashMap<String, ServerContent>>,
    offline: AtomicBool,
    saves: AtomicUsize,
}

impl FakeServer {
    fn with_chapter(chapter: &str, content: &str, version: i64) -> Arc<Self> {
        let server = Self::default();
        server.set_chapter(chapter, content, version);
        Arc::new(server)
    }

    fn set_chapter(&self, chapter: &str, content: &str, version: i64) {
        self.chapters.lock().unwrap().insert(
            chapter.to_string(),
            ServerContent {
                content: content.to_string(),
                version,
            },
        );
    }

    fn chapter(&self, chapter: &str) -> Option<ServerContent> {
        self.chapters.lock().unwrap().get(chapter).cloned()
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn reachable(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentService for FakeServer {
    async fn get_chapter_content(&self, _project_id: &str, chapter_id: &str) -> Result<ServerContent> {
        self.reachable()?;
        self.chapter(chapter_id)
            .ok_or_else(|| Error::NotFound(chapter_id.to_string()))
    }

    async fn save_chapter_content(
        &self,
        _project_id: &str,
        chapter_id: &str,
        content: &str,
    ) -> Result<i64> {
        self.reachable()?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        let mut chapters = self.chapters.lock().unwrap();
        let entry = chapters
            .entry(chapter_id.to_string())
            .or_insert_with(|| ServerContent {
                content: String::new(),
                version: 0,
            });
        entry.content = content.to_string();
        entry.version += 1;
        Ok(entry.version)
    }

    async fn create_chapter(
        &self,
        _project_id: &str,
        chapter_id: &str,
        _payload: &serde_json::Value,
    ) -> Result<()> {
        self.reachable()?;
        self.chapters
            .lock()
            .unwrap()
            .entry(chapter_id.to_string())
            .or_insert_with(|| ServerContent {
                content: String::new(),
                version: 0,
            });
        Ok(())
    }

    async fn update_chapter(
        &self,
        _project_id: &str,
        _chapter_id: &str,
        _payload: &serde_json::Value,
    ) -> Result<()> {
        self.reachable()
    }

    async fn delete_chapter(&self, _project_id: &str, chapter_id: &str) -> Result<()> {
        self.reachable()?;
        self.chapters.lock().unwrap().remove(chapter_id);
        Ok(())
    }
}

struct DownTransport {
    attempts: AtomicUsize,
}

#[async_trait]
impl MutationTransport for DownTransport {
    async fn send(&self, _mutation: &QueuedMutation) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Network("timed out".into()))
    }
}

fn controller(is_online: bool) -> OfflineController {
    OfflineController::new(Arc::new(LocalStore::in_memory()), is_online)
}

/// Chapter `c1` cached clean at server version 1, then edited offline to "Hello"
async fn edited_offline(controller: &OfflineController) {
    controller
        .store()
        .cache_server_snapshot("c1", "p1", "Original", 1)
        .await
        .unwrap();
    controller.set_online(false).await.unwrap();
    controller
        .queue_content_save("c1", "p1", "Hello")
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn cached_content_reads_back_dirty() {
    let controller = controller(false);

    controller.cache_content("c1", "p1", "first").await.unwrap();
    controller.cache_content("c1", "p1", "second").await.unwrap();

    let cached = controller.get_cached_content("c1").await.unwrap().unwrap();
    assert_eq!(cached.content, "second");
    assert!(cached.is_dirty);
    assert_eq!(cached.local_version, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_while_offline_caches_and_counts_once() {
    let controller = controller(false);

    let id = controller
        .queue_content_save("c1", "p1", "Hello")
        .await
        .unwrap();

    let state = controller.state();
    assert_eq!(state.pending_changes_count, 1);
    assert_eq!(state.sync_status, SyncStatus::Pending);

    let cached = controller.get_cached_content("c1").await.unwrap().unwrap();
    assert_eq!(cached.content, "Hello");
    assert!(cached.is_dirty);

    let queued = controller.store().pending_changes().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, id);
    assert_eq!(queued[0].change_type, ChangeType::ContentSave);
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_without_writes_keeps_count_stable() {
    let controller = controller(false);
    controller
        .queue_content_save("c1", "p1", "Hello")
        .await
        .unwrap();
    controller
        .queue_content_save("c2", "p1", "World")
        .await
        .unwrap();

    assert_eq!(controller.refresh_pending_count().await.unwrap(), 2);
    assert_eq!(controller.refresh_pending_count().await.unwrap(), 2);
    assert_eq!(controller.state().pending_changes_count, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn dirty_content_without_queued_change_counts_as_pending() {
    let controller = controller(false);
    controller.cache_content("c1", "p1", "unsaved").await.unwrap();
    controller
        .queue_content_save("c2", "p1", "queued")
        .await
        .unwrap();

    assert_eq!(controller.refresh_pending_count().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_with_matching_version_clears_dirty_state() {
    let controller = controller(true);
    edited_offline(&controller).await;
    let server = FakeServer::with_chapter("c1", "Original", 1);
    let executor = SyncExecutor::new(server.clone());
    let mut notifications = controller.notifications();

    controller.set_online(true).await.unwrap();
    let report = controller
        .sync_pending_changes(&executor)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.success_count, 1);
    assert!(controller.store().pending_changes().await.unwrap().is_empty());

    let cached = controller.get_cached_content("c1").await.unwrap().unwrap();
    assert!(!cached.is_dirty);
    assert_eq!(cached.server_version, Some(2));
    assert_eq!(server.chapter("c1").unwrap().content, "Hello");

    let state = controller.state();
    assert_eq!(state.sync_status, SyncStatus::Synced);
    assert_eq!(state.pending_changes_count, 0);
    assert!(!state.is_syncing);
    assert_eq!(state.last_sync_at, Some(report.finished_at));

    let reconnect = notifications.recv().await.unwrap();
    assert_eq!(reconnect.level, NotificationLevel::Success);
    let summary = notifications.recv().await.unwrap();
    assert_eq!(summary.title, "Synced");
    assert!(notifications.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_with_newer_server_version_parks_conflict() {
    let controller = controller(true);
    edited_offline(&controller).await;
    let server = FakeServer::with_chapter("c1", "Edited elsewhere", 2);
    let executor = SyncExecutor::new(server.clone());

    controller.set_online(true).await.unwrap();
    let report = controller
        .sync_pending_changes(&executor)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(server.saves.load(Ordering::SeqCst), 0);

    let state = controller.state();
    assert_eq!(state.sync_status, SyncStatus::Conflict);
    assert_eq!(state.conflicts.len(), 1);
    let conflict = &state.conflicts[0];
    assert_eq!(conflict.resource_id, "c1");
    assert_eq!(conflict.local_content, "Hello");
    assert_eq!(conflict.server_content, "Edited elsewhere");
    assert_eq!(conflict.server_version, 2);

    // The change stays queued behind the conflict.
    let queued = controller.store().pending_for_resource("c1").await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].status, ChangeStatus::Pending);
    assert_eq!(queued[0].retry_count, 0);

    // A second pass leaves the parked change alone.
    let again = controller
        .sync_pending_changes(&executor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.blocked_count, 1);
    assert_eq!(server.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn keep_server_twice_is_a_noop_the_second_time() {
    let controller = controller(true);
    edited_offline(&controller).await;
    let server = FakeServer::with_chapter("c1", "Edited elsewhere", 2);
    let executor = SyncExecutor::new(server.clone());
    controller.set_online(true).await.unwrap();
    controller.sync_pending_changes(&executor).await.unwrap();

    let resolved = controller
        .resolve_conflict(server.as_ref(), "c1", ConflictResolution::KeepServer)
        .await
        .unwrap();
    assert!(resolved);

    let again = controller
        .resolve_conflict(server.as_ref(), "c1", ConflictResolution::KeepServer)
        .await
        .unwrap();
    assert!(!again);

    let cached = controller.get_cached_content("c1").await.unwrap().unwrap();
    assert_eq!(cached.content, "Edited elsewhere");
    assert_eq!(cached.server_version, Some(2));
    assert!(!cached.is_dirty);

    let state = controller.state();
    assert!(state.conflicts.is_empty());
    assert_eq!(state.pending_changes_count, 0);
    assert_eq!(state.sync_status, SyncStatus::Synced);
    assert!(controller.store().conflicts().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_resolution_becomes_cached_content() {
    let controller = controller(true);
    edited_offline(&controller).await;
    let server = FakeServer::with_chapter("c1", "Edited elsewhere", 2);
    let executor = SyncExecutor::new(server.clone());
    controller.set_online(true).await.unwrap();
    controller.sync_pending_changes(&executor).await.unwrap();

    let merged = "Hello, edited elsewhere";
    controller
        .resolve_conflict(
            server.as_ref(),
            "c1",
            ConflictResolution::Merge(merged.to_string()),
        )
        .await
        .unwrap();

    let cached = controller.get_cached_content("c1").await.unwrap().unwrap();
    assert_eq!(cached.content, merged);
    assert_eq!(cached.server_version, Some(3));
    assert_eq!(server.chapter("c1").unwrap().content, merged);
    assert!(controller.store().pending_changes().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn keep_local_while_unreachable_requeues_rebased_save() {
    let controller = controller(true);
    edited_offline(&controller).await;
    let server = FakeServer::with_chapter("c1", "Edited elsewhere", 2);
    let executor = SyncExecutor::new(server.clone());
    controller.set_online(true).await.unwrap();
    controller.sync_pending_changes(&executor).await.unwrap();

    server.set_offline(true);
    let resolved = controller
        .resolve_conflict(server.as_ref(), "c1", ConflictResolution::KeepLocal)
        .await
        .unwrap();
    assert!(resolved);

    let cached = controller.get_cached_content("c1").await.unwrap().unwrap();
    assert_eq!(cached.content, "Hello");
    assert_eq!(cached.server_version, Some(2));
    assert!(cached.is_dirty);
    assert_eq!(controller.state().pending_changes_count, 1);

    server.set_offline(false);
    let report = controller
        .sync_pending_changes(&executor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.success_count, 1);
    assert!(report.conflicts.is_empty());
    assert_eq!(server.chapter("c1").unwrap().content, "Hello");
}

#[tokio::test(flavor = "multi_thread")]
async fn dismissed_conflict_is_retried_and_detected_again() {
    let controller = controller(true);
    edited_offline(&controller).await;
    let server = FakeServer::with_chapter("c1", "Edited elsewhere", 2);
    let executor = SyncExecutor::new(server.clone());
    controller.set_online(true).await.unwrap();
    controller.sync_pending_changes(&executor).await.unwrap();

    assert!(controller.dismiss_conflict("c1").await.unwrap());
    assert!(controller.state().conflicts.is_empty());
    assert_eq!(controller.store().pending_for_resource("c1").await.unwrap().len(), 1);

    let report = controller
        .sync_pending_changes(&executor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(controller.state().conflicts.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_resolution_restores_conflict() {
    let controller = controller(true);
    edited_offline(&controller).await;
    let server = FakeServer::with_chapter("c1", "Edited elsewhere", 2);
    let executor = SyncExecutor::new(server.clone());
    controller.set_online(true).await.unwrap();
    controller.sync_pending_changes(&executor).await.unwrap();

    struct Rejecting;

    #[async_trait]
    impl ContentService for Rejecting {
        async fn get_chapter_content(&self, _: &str, _: &str) -> Result<ServerContent> {
            Err(Error::Remote { status: 403, message: "forbidden".into() })
        }
        async fn save_chapter_content(&self, _: &str, _: &str, _: &str) -> Result<i64> {
            Err(Error::Remote { status: 403, message: "forbidden".into() })
        }
        async fn create_chapter(&self, _: &str, _: &str, _: &serde_json::Value) -> Result<()> {
            Ok(())
        }
        async fn update_chapter(&self, _: &str, _: &str, _: &serde_json::Value) -> Result<()> {
            Ok(())
        }
        async fn delete_chapter(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    let result = controller
        .resolve_conflict(&Rejecting, "c1", ConflictResolution::KeepLocal)
        .await;
    assert!(result.is_err());

    let state = controller.state();
    assert_eq!(state.conflicts.len(), 1);
    assert_eq!(state.sync_status, SyncStatus::Conflict);
    assert!(state.sync_error.is_some());
    assert_eq!(controller.store().conflicts().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_server_exhausts_retries_once() {
    let controller = controller(false);
    controller
        .queue_content_save("c9", "p1", "Draft")
        .await
        .unwrap();
    let server = Arc::new(FakeServer::default());
    server.set_offline(true);
    let executor = SyncExecutor::new(server.clone());
    controller.set_online(true).await.unwrap();
    let mut notifications = controller.notifications();

    for _ in 0..3 {
        controller.sync_pending_changes(&executor).await.unwrap();
    }

    let queued = controller.store().pending_changes().await.unwrap();
    assert_eq!(queued[0].status, ChangeStatus::Failed);
    assert_eq!(queued[0].retry_count, 3);

    let mut levels = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        levels.push(notification.level);
    }
    assert_eq!(
        levels,
        vec![
            NotificationLevel::Warning,
            NotificationLevel::Warning,
            NotificationLevel::Error
        ]
    );

    // Still attempted after the cap, without repeating the failure report.
    let stalled = controller
        .sync_pending_changes(&executor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stalled.fail_count, 0);
    assert_eq!(stalled.stalled_count, 1);
    assert!(stalled.exhausted.is_empty());
    assert!(notifications.try_recv().is_err());
    assert_eq!(controller.state().sync_status, SyncStatus::Pending);

    // Reconnecting restores the retry budget.
    controller.set_online(false).await.unwrap();
    controller.set_online(true).await.unwrap();
    let queued = controller.store().pending_changes().await.unwrap();
    assert_eq!(queued[0].status, ChangeStatus::Pending);
    assert_eq!(queued[0].retry_count, 0);

    server.set_offline(false);
    let report = controller
        .sync_pending_changes(&executor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.success_count, 1);
    assert_eq!(server.chapter("c9").unwrap().content, "Draft");

    let state = controller.state();
    assert_eq!(state.pending_changes_count, 0);
    assert_eq!(state.sync_status, SyncStatus::Synced);
    let cached = controller.get_cached_content("c9").await.unwrap().unwrap();
    assert!(!cached.is_dirty);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_change_delivers_without_reconnect() {
    let controller = controller(true);
    controller
        .queue_content_save("c9", "p1", "Draft")
        .await
        .unwrap();
    let server = Arc::new(FakeServer::default());
    server.set_offline(true);
    let executor = SyncExecutor::new(server.clone());

    for _ in 0..3 {
        controller.sync_pending_changes(&executor).await.unwrap();
    }
    server.set_offline(false);
    controller.sync_pending_changes(&executor).await.unwrap();

    assert_eq!(server.chapter("c9").unwrap().content, "Draft");
    assert!(controller.store().pending_changes().await.unwrap().is_empty());
}

/// Server whose content saves wait until released
struct GatedServer {
    inner: FakeServer,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ContentService for GatedServer {
    async fn get_chapter_content(&self, project_id: &str, chapter_id: &str) -> Result<ServerContent> {
        self.inner.get_chapter_content(project_id, chapter_id).await
    }

    async fn save_chapter_content(
        &self,
        project_id: &str,
        chapter_id: &str,
        content: &str,
    ) -> Result<i64> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner
            .save_chapter_content(project_id, chapter_id, content)
            .await
    }

    async fn create_chapter(
        &self,
        project_id: &str,
        chapter_id: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        self.inner.create_chapter(project_id, chapter_id, payload).await
    }

    async fn update_chapter(
        &self,
        project_id: &str,
        chapter_id: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        self.inner.update_chapter(project_id, chapter_id, payload).await
    }

    async fn delete_chapter(&self, project_id: &str, chapter_id: &str) -> Result<()> {
        self.inner.delete_chapter(project_id, chapter_id).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn overlapping_sync_pass_is_skipped() {
    let controller = Arc::new(controller(true));
    controller
        .queue_content_save("c1", "p1", "Hello")
        .await
        .unwrap();
    let server = Arc::new(GatedServer {
        inner: FakeServer::default(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let executor = Arc::new(SyncExecutor::new(server.clone()));

    let first = tokio::spawn({
        let controller = controller.clone();
        let executor = executor.clone();
        async move { controller.sync_pending_changes(&executor).await }
    });
    server.entered.notified().await;

    assert!(controller.state().is_syncing);
    assert!(controller
        .sync_pending_changes(&executor)
        .await
        .unwrap()
        .is_none());
    assert_eq!(controller.state().sync_status, SyncStatus::Syncing);

    server.release.notify_one();
    let report = first.await.unwrap().unwrap().unwrap();
    assert_eq!(report.success_count, 1);
    assert_eq!(server.inner.saves.load(Ordering::SeqCst), 1);
    assert!(!controller.state().is_syncing);
    assert_eq!(controller.state().sync_status, SyncStatus::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn save_content_goes_direct_online_and_queues_on_failure() {
    let controller = controller(true);
    let server = FakeServer::with_chapter("c1", "", 0);

    let outcome = controller
        .save_content(server.as_ref(), "c1", "p1", "Live")
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { version: 1 });
    assert_eq!(controller.state().pending_changes_count, 0);

    server.set_offline(true);
    let outcome = controller
        .save_content(server.as_ref(), "c1", "p1", "Spotty")
        .await
        .unwrap();
    assert!(matches!(outcome, SaveOutcome::Queued(_)));
    assert_eq!(controller.state().pending_changes_count, 1);

    let cached = controller.get_cached_content("c1").await.unwrap().unwrap();
    assert_eq!(cached.content, "Spotty");
    assert_eq!(cached.server_version, Some(1));
    assert!(cached.is_dirty);
}

#[tokio::test(flavor = "multi_thread")]
async fn save_content_detects_conflict_before_writing() {
    let controller = controller(true);
    let server = FakeServer::with_chapter("c1", "Original", 1);
    controller
        .store()
        .cache_server_snapshot("c1", "p1", "Original", 1)
        .await
        .unwrap();
    server.set_chapter("c1", "Someone else", 4);

    let outcome = controller
        .save_content(server.as_ref(), "c1", "p1", "Mine")
        .await
        .unwrap();

    let SaveOutcome::Conflict(conflict) = outcome else {
        panic!("expected a conflict, got {outcome:?}");
    };
    assert_eq!(conflict.local_content, "Mine");
    assert_eq!(conflict.server_version, 4);
    assert_eq!(server.saves.load(Ordering::SeqCst), 0);
    assert_eq!(controller.state().sync_status, SyncStatus::Conflict);
}

#[tokio::test(flavor = "multi_thread")]
async fn load_chapter_prefers_dirty_local_content() {
    let controller = controller(true);
    let server = FakeServer::with_chapter("c1", "Server text", 3);

    let loaded = controller
        .load_chapter(server.as_ref(), "p1", "c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.content, "Server text");
    assert_eq!(loaded.server_version, Some(3));

    controller.cache_content("c1", "p1", "Local edit").await.unwrap();
    let loaded = controller
        .load_chapter(server.as_ref(), "p1", "c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.content, "Local edit");
}

#[tokio::test(flavor = "multi_thread")]
async fn structural_changes_sync_in_order() {
    let controller = controller(false);
    let server = Arc::new(FakeServer::default());
    let executor = SyncExecutor::new(server.clone());

    controller
        .queue_chapter_change(
            ChangeType::ChapterCreate,
            ResourceType::Chapter,
            "c5",
            "p1",
            serde_json::json!({ "title": "Chapter Five" }),
        )
        .await
        .unwrap();
    controller
        .queue_content_save("c5", "p1", "It begins.")
        .await
        .unwrap();
    assert_eq!(controller.state().pending_changes_count, 2);

    controller.set_online(true).await.unwrap();
    let report = controller
        .sync_pending_changes(&executor)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.success_count, 2);
    assert_eq!(server.chapter("c5").unwrap().content, "It begins.");
    assert_eq!(controller.state().pending_changes_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_mutation_dropped_after_three_failures() {
    let controller = controller(true);
    let mut notifications = controller.notifications();
    let transport = DownTransport {
        attempts: AtomicUsize::new(0),
    };
    controller.queue_mutation(
        MutationKind::Create,
        "/projects/p1/volumes",
        serde_json::json!({ "title": "Book Two" }),
    );

    for _ in 0..3 {
        controller.replay_mutations(&transport).await;
    }
    let last = controller.replay_mutations(&transport).await;

    assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    assert!(controller.state().pending_mutations.is_empty());
    assert_eq!(last.failed, 0);

    let notification = notifications.try_recv().unwrap();
    assert_eq!(notification.level, NotificationLevel::Error);
    assert!(notification.message.contains("/projects/p1/volumes"));
    assert!(notifications.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn conflicts_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inkwell.db");
    let server = FakeServer::with_chapter("c1", "Edited elsewhere", 2);

    {
        let controller = OfflineController::new(Arc::new(LocalStore::new(&path)), true);
        edited_offline(&controller).await;
        controller.set_online(true).await.unwrap();
        controller
            .sync_pending_changes(&SyncExecutor::new(server.clone()))
            .await
            .unwrap();
    }

    let reopened = OfflineController::new(Arc::new(LocalStore::new(&path)), false);
    reopened.hydrate().await.unwrap();

    let state = reopened.state();
    assert_eq!(state.conflicts.len(), 1);
    assert_eq!(state.conflicts[0].resource_id, "c1");
    assert_eq!(state.sync_status, SyncStatus::Conflict);
    assert_eq!(state.pending_changes_count, 1);
    assert!(state.last_sync_at.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn store_watcher_keeps_count_in_step_with_direct_writes() {
    let controller = Arc::new(controller(false));
    let watcher = controller.watch_store();
    let mut state = controller.subscribe();

    controller
        .store()
        .cache_content("c1", "p1", "written behind the controller's back")
        .await
        .unwrap();

    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.wait_for(|state| state.pending_changes_count == 1),
    )
    .await
    .expect("watcher should refresh the count")
    .unwrap();

    watcher.abort();
}
