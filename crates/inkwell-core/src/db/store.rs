//! Local Store: durable key-value persistence over the three logical stores.
//!
//! The store opens lazily. The first operation runs schema setup and every
//! concurrent caller awaits that same initialization. Each write publishes a
//! [`StoreEvent`] so in-memory projections can refresh without polling.

use std::path::PathBuf;

use libsql::{Connection, Value};
use tokio::sync::{broadcast, Mutex, OnceCell};

use super::record::{ContentIndex, MetadataIndex, PendingIndex, Record, StoreName};
use super::{Database, StoreLocation};
use crate::error::{Error, Result};
use crate::models::{
    CachedContent, ChangeStatus, ChangeType, ConflictInfo, ContentSavePayload, PendingChange,
    SyncMetadata, SyncStatus, GLOBAL_SYNC_ID,
};

const EVENT_CAPACITY: usize = 256;

/// Change notification published after every committed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub store: StoreName,
    /// Affected key, `None` when the whole store was cleared
    pub key: Option<String>,
}

/// A set of writes committed atomically by [`LocalStore::commit`].
#[derive(Default)]
pub struct StoreBatch {
    statements: Vec<(String, Vec<Value>)>,
    events: Vec<StoreEvent>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an upsert
    pub fn put<R: Record>(&mut self, record: &R) -> Result<&mut Self> {
        self.statements.push((upsert_sql::<R>(), record.to_values()?));
        self.events.push(StoreEvent {
            store: R::STORE,
            key: Some(record.key()),
        });
        Ok(self)
    }

    /// Queue a delete by key
    pub fn delete<R: Record>(&mut self, key: &str) -> &mut Self {
        self.statements.push((
            format!("DELETE FROM {} WHERE id = ?1", R::STORE.table()),
            vec![Value::Text(key.to_string())],
        ));
        self.events.push(StoreEvent {
            store: R::STORE,
            key: Some(key.to_string()),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

fn upsert_sql<R: Record>() -> String {
    let columns = R::COLUMNS.join(", ");
    let placeholders = (1..=R::COLUMNS.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = R::COLUMNS
        .iter()
        .skip(1)
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders})
         ON CONFLICT(id) DO UPDATE SET {updates}",
        table = R::STORE.table()
    )
}

fn select_sql<R: Record>() -> String {
    format!("SELECT {} FROM {}", R::COLUMNS.join(", "), R::STORE.table())
}

/// Durable store for cached content, pending changes, and sync metadata
pub struct LocalStore {
    location: StoreLocation,
    db: OnceCell<Database>,
    // Serializes writers so manual transactions never interleave.
    write_lock: Mutex<()>,
    // Held from reading a cache record until its rebuilt version commits.
    content_lock: Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
}

impl LocalStore {
    /// Create a store backed by a database file. Nothing is opened until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_location(StoreLocation::File(path.into()))
    }

    /// Create a store backed by an in-memory database (useful for testing)
    pub fn in_memory() -> Self {
        Self::with_location(StoreLocation::Memory)
    }

    fn with_location(location: StoreLocation) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            location,
            db: OnceCell::new(),
            write_lock: Mutex::new(()),
            content_lock: Mutex::new(()),
            events,
        }
    }

    pub const fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Subscribe to committed write notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Open and migrate the database once; later calls reuse it.
    ///
    /// Any failure to bring the engine up is reported as `StorageUnavailable`
    /// and the next call tries again.
    pub async fn init(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> Result<&Connection> {
        let db = self
            .db
            .get_or_try_init(|| async {
                Database::open(&self.location).await.map_err(|error| match error {
                    Error::StorageUnavailable(_) => error,
                    other => {
                        tracing::error!("Local store failed to open: {other}");
                        Error::StorageUnavailable(other.to_string())
                    }
                })
            })
            .await?;

        Ok(db.connection())
    }

    fn publish(&self, events: impl IntoIterator<Item = StoreEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    async fn query_records<R: Record>(&self, sql: &str, params: Vec<Value>) -> Result<Vec<R>> {
        let conn = self.connection().await?;
        let mut rows = conn.query(sql, libsql::params_from_iter(params)).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(R::from_row(&row)?);
        }
        Ok(records)
    }

    /// Fetch a record by primary key
    pub async fn get<R: Record>(&self, key: &str) -> Result<Option<R>> {
        let sql = format!("{} WHERE id = ?1", select_sql::<R>());
        let mut records = self
            .query_records::<R>(&sql, vec![Value::Text(key.to_string())])
            .await?;
        Ok(records.pop())
    }

    /// Upsert a whole record by primary key
    pub async fn put<R: Record>(&self, record: &R) -> Result<()> {
        let mut batch = StoreBatch::new();
        batch.put(record)?;
        self.commit(batch).await
    }

    /// Delete a record by primary key. Returns whether a row was removed.
    pub async fn delete<R: Record>(&self, key: &str) -> Result<bool> {
        let conn = self.connection().await?;
        let removed = {
            let _guard = self.write_lock.lock().await;
            conn.execute(
                &format!("DELETE FROM {} WHERE id = ?1", R::STORE.table()),
                [key],
            )
            .await?
        };

        if removed > 0 {
            self.publish([StoreEvent {
                store: R::STORE,
                key: Some(key.to_string()),
            }]);
        }
        Ok(removed > 0)
    }

    /// Snapshot of every record in a store
    pub async fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        let sql = format!("{} ORDER BY {}", select_sql::<R>(), R::ORDER_BY);
        self.query_records::<R>(&sql, Vec::new()).await
    }

    /// Records matching a secondary index value
    pub async fn get_by_index<R: Record>(&self, index: &R::Index) -> Result<Vec<R>> {
        let (column, value) = R::index_filter(index);
        let sql = format!(
            "{} WHERE {column} = ?1 ORDER BY {}",
            select_sql::<R>(),
            R::ORDER_BY
        );
        self.query_records::<R>(&sql, vec![value]).await
    }

    /// Remove every record from a store
    pub async fn clear<R: Record>(&self) -> Result<()> {
        let conn = self.connection().await?;
        {
            let _guard = self.write_lock.lock().await;
            conn.execute(&format!("DELETE FROM {}", R::STORE.table()), ())
                .await?;
        }
        self.publish([StoreEvent {
            store: R::STORE,
            key: None,
        }]);
        Ok(())
    }

    /// Number of records in a store
    pub async fn count<R: Record>(&self) -> Result<usize> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(&format!("SELECT COUNT(*) FROM {}", R::STORE.table()), ())
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Apply a batch of writes in a single transaction.
    ///
    /// Either every write lands or none does; events are published only after
    /// the commit succeeds.
    pub async fn commit(&self, batch: StoreBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let conn = self.connection().await?;
        {
            let _guard = self.write_lock.lock().await;
            conn.execute("BEGIN TRANSACTION", ()).await?;

            for (sql, values) in batch.statements {
                if let Err(e) = conn.execute(&sql, libsql::params_from_iter(values)).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
            }

            if let Err(e) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        }

        self.publish(batch.events);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Content cache
    // -----------------------------------------------------------------------

    /// Cached content for a chapter
    pub async fn cached_content(&self, chapter_id: &str) -> Result<Option<CachedContent>> {
        self.get::<CachedContent>(chapter_id).await
    }

    /// Rebuild a chapter's cache record from its committed value.
    ///
    /// `build` sees the record as it is now and fills the batch. No other cache
    /// rebuild starts until the batch commits, so a concurrent edit is never
    /// overwritten from a stale read.
    async fn update_content<T>(
        &self,
        chapter_id: &str,
        build: impl FnOnce(Option<CachedContent>, &mut StoreBatch) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.content_lock.lock().await;
        let current = self.cached_content(chapter_id).await?;
        let mut batch = StoreBatch::new();
        let value = build(current, &mut batch)?;
        self.commit(batch).await?;
        Ok(value)
    }

    /// Write a local edit through to the cache and mark it dirty
    pub async fn cache_content(
        &self,
        chapter_id: &str,
        project_id: &str,
        content: &str,
    ) -> Result<CachedContent> {
        self.update_content(chapter_id, |previous, batch| {
            let record = CachedContent::local_edit(chapter_id, project_id, content, previous.as_ref());
            batch.put(&record)?;
            Ok(record)
        })
        .await
    }

    /// Cache server content as clean at the given server version
    pub async fn cache_server_snapshot(
        &self,
        chapter_id: &str,
        project_id: &str,
        content: &str,
        server_version: i64,
    ) -> Result<CachedContent> {
        self.update_content(chapter_id, |previous, batch| {
            let record = CachedContent::server_snapshot(
                chapter_id,
                project_id,
                content,
                server_version,
                previous.as_ref(),
            );
            batch.put(&record)?;
            Ok(record)
        })
        .await
    }

    /// Remove a synced content save and record the server version it produced.
    ///
    /// The server version always advances. `is_dirty` only clears when no
    /// local edit newer than `synced_local_version` has landed in the meantime.
    pub async fn mark_synced(
        &self,
        change: &PendingChange,
        server_version: i64,
        synced_local_version: i64,
    ) -> Result<()> {
        self.update_content(&change.resource_id, |current, batch| {
            batch.delete::<PendingChange>(&change.key());
            if let Some(mut cached) = current {
                cached.server_version = Some(server_version);
                if cached.local_version <= synced_local_version {
                    cached.is_dirty = false;
                }
                batch.put(&cached)?;
            }
            Ok(())
        })
        .await
    }

    /// Cached content for a project
    pub async fn project_content(&self, project_id: &str) -> Result<Vec<CachedContent>> {
        self.get_by_index::<CachedContent>(&ContentIndex::ProjectId(project_id.to_string()))
            .await
    }

    /// Cached content not yet confirmed synced
    pub async fn dirty_content(&self) -> Result<Vec<CachedContent>> {
        self.get_by_index::<CachedContent>(&ContentIndex::IsDirty(true))
            .await
    }

    // -----------------------------------------------------------------------
    // Pending changes
    // -----------------------------------------------------------------------

    /// Cache a local edit and queue its content save as one unit of work.
    ///
    /// The queued payload carries the local version the edit was written at.
    pub async fn save_and_enqueue(
        &self,
        chapter_id: &str,
        project_id: &str,
        content: &str,
    ) -> Result<(CachedContent, PendingChange)> {
        self.update_content(chapter_id, |previous, batch| {
            let record = CachedContent::local_edit(chapter_id, project_id, content, previous.as_ref());
            let change = PendingChange::content_save(
                chapter_id,
                project_id,
                &ContentSavePayload {
                    content: content.to_string(),
                    local_version: record.local_version,
                },
            )?;
            batch.put(&record)?.put(&change)?;
            Ok((record, change))
        })
        .await
    }

    /// All queued changes in enqueue order
    pub async fn pending_changes(&self) -> Result<Vec<PendingChange>> {
        self.get_all::<PendingChange>().await
    }

    /// Queued changes targeting one resource, in enqueue order
    pub async fn pending_for_resource(&self, resource_id: &str) -> Result<Vec<PendingChange>> {
        self.get_by_index::<PendingChange>(&PendingIndex::ResourceId(resource_id.to_string()))
            .await
    }

    /// Drop queued content saves for a chapter and rewrite its cache record atomically.
    ///
    /// `build` receives the current record and returns its replacement plus an
    /// optional fresh change to queue in place of the dropped saves.
    pub async fn replace_content_saves(
        &self,
        chapter_id: &str,
        build: impl FnOnce(Option<&CachedContent>) -> Result<(CachedContent, Option<PendingChange>)>,
    ) -> Result<CachedContent> {
        let _guard = self.content_lock.lock().await;
        let existing = self.pending_for_resource(chapter_id).await?;
        let current = self.cached_content(chapter_id).await?;

        let mut batch = StoreBatch::new();
        for change in existing
            .iter()
            .filter(|change| change.change_type == ChangeType::ContentSave)
        {
            batch.delete::<PendingChange>(&change.key());
        }
        let (record, replacement) = build(current.as_ref())?;
        batch.put(&record)?;
        if let Some(change) = &replacement {
            batch.put(change)?;
        }
        self.commit(batch).await?;
        Ok(record)
    }

    /// Put every change parked as `Failed` back in line with a fresh retry budget
    pub async fn reset_failed_changes(&self) -> Result<usize> {
        let failed = self
            .get_by_index::<PendingChange>(&PendingIndex::Status(ChangeStatus::Failed))
            .await?;

        let count = failed.len();
        let mut batch = StoreBatch::new();
        for mut change in failed {
            change.reset_retries();
            batch.put(&change)?;
        }
        self.commit(batch).await?;
        Ok(count)
    }

    /// Drop a queued change.
    ///
    /// A discarded content save keeps its cached text. The chapter stays
    /// dirty only while another content save for it is still queued.
    pub async fn discard_change(&self, id: &str) -> Result<Option<PendingChange>> {
        let _guard = self.content_lock.lock().await;
        let Some(change) = self.get::<PendingChange>(id).await? else {
            return Ok(None);
        };

        let mut batch = StoreBatch::new();
        batch.delete::<PendingChange>(&change.key());
        if change.change_type == ChangeType::ContentSave {
            let others_queued = self
                .pending_for_resource(&change.resource_id)
                .await?
                .iter()
                .any(|other| other.id != change.id && other.change_type == ChangeType::ContentSave);
            if let Some(mut cached) = self.cached_content(&change.resource_id).await? {
                if cached.is_dirty && !others_queued {
                    cached.is_dirty = false;
                    batch.put(&cached)?;
                }
            }
        }
        self.commit(batch).await?;
        Ok(Some(change))
    }

    /// Changes not yet confirmed plus dirty content with no queued change.
    ///
    /// Dirty content without a queued change is left behind when a process dies
    /// between the cache write and the enqueue; counting it keeps it visible.
    pub async fn unsynced_count(&self) -> Result<usize> {
        let changes = self.pending_changes().await?;
        let dirty = self.dirty_content().await?;

        let orphaned = dirty
            .iter()
            .filter(|content| {
                !changes.iter().any(|change| {
                    change.change_type == ChangeType::ContentSave
                        && change.resource_id == content.id
                })
            })
            .count();

        Ok(changes.len() + orphaned)
    }

    // -----------------------------------------------------------------------
    // Sync metadata
    // -----------------------------------------------------------------------

    /// Park a conflict for a resource until it is resolved or dismissed
    pub async fn record_conflict(&self, conflict: &ConflictInfo) -> Result<()> {
        self.put(&SyncMetadata::conflict(conflict.clone())).await
    }

    /// Stored conflict for a resource, if any
    pub async fn conflict_for(&self, resource_id: &str) -> Result<Option<ConflictInfo>> {
        Ok(self
            .get::<SyncMetadata>(resource_id)
            .await?
            .and_then(|metadata| metadata.conflict_data))
    }

    /// All unresolved conflicts
    pub async fn conflicts(&self) -> Result<Vec<ConflictInfo>> {
        let parked = self
            .get_by_index::<SyncMetadata>(&MetadataIndex::SyncStatus(SyncStatus::Conflict))
            .await?;
        Ok(parked
            .into_iter()
            .filter(|metadata| !metadata.is_global())
            .filter_map(|metadata| metadata.conflict_data)
            .collect())
    }

    /// Drop the conflict marker for a resource, leaving its status at `status`
    pub async fn clear_conflict(
        &self,
        resource_id: &str,
        status: SyncStatus,
        at: i64,
    ) -> Result<()> {
        self.put(&SyncMetadata {
            id: resource_id.to_string(),
            last_sync_at: Some(at),
            sync_status: status,
            conflict_data: None,
        })
        .await
    }

    /// Global sync record
    pub async fn global_metadata(&self) -> Result<Option<SyncMetadata>> {
        self.get::<SyncMetadata>(GLOBAL_SYNC_ID).await
    }

    /// Overwrite the global sync record
    pub async fn update_global(&self, status: SyncStatus, at: i64) -> Result<()> {
        self.put(&SyncMetadata::global(status, at)).await
    }
}
