//! Observable offline/sync state

use serde::Serialize;

use crate::models::{ConflictInfo, QueuedMutation, SyncStatus};
use crate::sync::SyncReport;

/// Snapshot published to every state subscriber
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OfflineState {
    pub is_online: bool,
    pub sync_status: SyncStatus,
    /// Unsynced queued changes plus orphaned dirty content
    pub pending_changes_count: usize,
    /// Unresolved conflicts awaiting a user decision
    pub conflicts: Vec<ConflictInfo>,
    pub is_syncing: bool,
    /// Last finished sync pass (Unix ms)
    pub last_sync_at: Option<i64>,
    pub sync_error: Option<String>,
    /// Fire-and-forget mutations awaiting replay
    pub pending_mutations: Vec<QueuedMutation>,
}

impl OfflineState {
    pub fn conflict(&self, resource_id: &str) -> Option<&ConflictInfo> {
        self.conflicts
            .iter()
            .find(|conflict| conflict.resource_id == resource_id)
    }

    /// Add or replace the conflict for its resource
    pub fn upsert_conflict(&mut self, conflict: ConflictInfo) {
        if let Some(existing) = self
            .conflicts
            .iter_mut()
            .find(|existing| existing.resource_id == conflict.resource_id)
        {
            *existing = conflict;
        } else {
            self.conflicts.push(conflict);
        }
    }

    /// Close a sync pass with its report and the recounted pending total
    pub fn finish_pass(&mut self, report: &SyncReport, pending_count: usize) {
        for conflict in &report.conflicts {
            self.upsert_conflict(conflict.clone());
        }
        self.is_syncing = false;
        self.pending_changes_count = pending_count;
        self.last_sync_at = Some(report.finished_at);
        self.sync_status = report.status;
        if report.status == SyncStatus::Synced && pending_count > 0 {
            self.sync_status = SyncStatus::Pending;
        }
    }

    /// Status implied by current conflicts and pending work
    pub fn settled_status(&self) -> SyncStatus {
        if !self.conflicts.is_empty() {
            SyncStatus::Conflict
        } else if self.pending_changes_count > 0 || !self.pending_mutations.is_empty() {
            SyncStatus::Pending
        } else {
            SyncStatus::Synced
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceType;

    fn conflict(resource_id: &str, server_version: i64) -> ConflictInfo {
        ConflictInfo {
            resource_id: resource_id.into(),
            resource_type: ResourceType::Chapter,
            local_content: "mine".into(),
            server_content: "theirs".into(),
            local_version: 1,
            server_version,
            timestamp: 0,
        }
    }

    #[test]
    fn upsert_conflict_replaces_same_resource() {
        let mut state = OfflineState::default();
        state.upsert_conflict(conflict("c1", 2));
        state.upsert_conflict(conflict("c2", 2));
        state.upsert_conflict(conflict("c1", 3));

        assert_eq!(state.conflicts.len(), 2);
        assert_eq!(state.conflict("c1").unwrap().server_version, 3);
    }

    #[test]
    fn settled_status_priorities() {
        let mut state = OfflineState::default();
        assert_eq!(state.settled_status(), SyncStatus::Synced);

        state.pending_changes_count = 1;
        assert_eq!(state.settled_status(), SyncStatus::Pending);

        state.upsert_conflict(conflict("c1", 2));
        assert_eq!(state.settled_status(), SyncStatus::Conflict);
    }

    #[test]
    fn finish_pass_always_clears_syncing() {
        let mut state = OfflineState {
            is_syncing: true,
            sync_status: SyncStatus::Syncing,
            pending_changes_count: 2,
            ..OfflineState::default()
        };
        let report = SyncReport {
            success_count: 1,
            status: SyncStatus::Synced,
            finished_at: 42,
            ..SyncReport::default()
        };

        // A recount that could not run keeps the count from before the pass.
        state.finish_pass(&report, 2);
        assert!(!state.is_syncing);
        assert_eq!(state.last_sync_at, Some(42));
        assert_eq!(state.sync_status, SyncStatus::Pending);

        state.is_syncing = true;
        let conflicted = SyncReport {
            conflicts: vec![conflict("c1", 3)],
            status: SyncStatus::Conflict,
            ..SyncReport::default()
        };
        state.finish_pass(&conflicted, 0);
        assert!(!state.is_syncing);
        assert_eq!(state.sync_status, SyncStatus::Conflict);
        assert_eq!(state.conflict("c1").unwrap().server_version, 3);
    }
}
