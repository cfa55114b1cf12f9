//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
pub(super) const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = version(conn).await?;

    if version < 1 {
        apply(conn, 1, &V1_STATEMENTS).await?;
    }
    if version < 2 {
        apply(conn, 2, &V2_STATEMENTS).await?;
    }

    Ok(())
}

/// Highest applied schema version, 0 for a fresh database
pub(super) async fn version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Version 1: content cache, pending changes, sync metadata
const V1_STATEMENTS: [&str; 12] = [
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS editor_content (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        content TEXT NOT NULL,
        local_version INTEGER NOT NULL,
        server_version INTEGER,
        last_modified INTEGER NOT NULL,
        is_dirty INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_editor_content_project ON editor_content(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_editor_content_dirty ON editor_content(is_dirty)",
    "CREATE INDEX IF NOT EXISTS idx_editor_content_modified ON editor_content(last_modified DESC)",
    "CREATE TABLE IF NOT EXISTS pending_changes (
        id TEXT PRIMARY KEY,
        change_type TEXT NOT NULL,
        resource_type TEXT NOT NULL,
        resource_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        payload TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        error_message TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_pending_changes_project ON pending_changes(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_pending_changes_timestamp ON pending_changes(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_pending_changes_status ON pending_changes(status)",
    "CREATE TABLE IF NOT EXISTS sync_metadata (
        id TEXT PRIMARY KEY,
        last_sync_at INTEGER,
        sync_status TEXT NOT NULL,
        conflict_data TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_metadata_status ON sync_metadata(sync_status)",
    "INSERT INTO schema_version (version) VALUES (1)",
];

/// Version 2: lookup of queued changes by resource
const V2_STATEMENTS: [&str; 2] = [
    "CREATE INDEX IF NOT EXISTS idx_pending_changes_resource ON pending_changes(resource_id)",
    "INSERT INTO schema_version (version) VALUES (2)",
];

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version} (target {CURRENT_VERSION})");
    Ok(())
}
