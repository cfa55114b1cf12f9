//! Cached editor content model

use serde::{Deserialize, Serialize};

use crate::util::now_millis;

/// Last known local state of one editable chapter.
///
/// Written through on every local edit. `is_dirty` stays set until a sync
/// confirms the exact `local_version` that was edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedContent {
    /// Chapter identifier (primary key)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// Chapter text
    pub content: String,
    /// Monotonic counter bumped on every local edit
    pub local_version: i64,
    /// Last server version confirmed synced, `None` until the first sync
    pub server_version: Option<i64>,
    /// Last modification timestamp (Unix ms)
    pub last_modified: i64,
    /// Local content not yet confirmed synced
    pub is_dirty: bool,
}

impl CachedContent {
    /// Build the next cache record for a local edit.
    ///
    /// Bumps `local_version` past `previous` and keeps the server version the
    /// edit was based on.
    #[must_use]
    pub fn local_edit(
        id: impl Into<String>,
        project_id: impl Into<String>,
        content: impl Into<String>,
        previous: Option<&Self>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            content: content.into(),
            local_version: previous.map_or(1, |cached| cached.local_version + 1),
            server_version: previous.and_then(|cached| cached.server_version),
            last_modified: now_millis(),
            is_dirty: true,
        }
    }

    /// Build a clean cache record mirroring server state.
    #[must_use]
    pub fn server_snapshot(
        id: impl Into<String>,
        project_id: impl Into<String>,
        content: impl Into<String>,
        server_version: i64,
        previous: Option<&Self>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            content: content.into(),
            local_version: previous.map_or(0, |cached| cached.local_version),
            server_version: Some(server_version),
            last_modified: now_millis(),
            is_dirty: false,
        }
    }

    /// Whether the server has moved past the version this content was based on.
    ///
    /// Content that was never synced has no base version and cannot conflict.
    pub fn is_behind(&self, fetched_server_version: i64) -> bool {
        self.server_version
            .is_some_and(|base| fetched_server_version > base)
    }
}
