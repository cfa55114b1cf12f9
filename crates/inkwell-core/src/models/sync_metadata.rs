//! Sync metadata model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ConflictInfo;
use crate::error::Error;

/// Key of the process-wide metadata row
pub const GLOBAL_SYNC_ID: &str = "global";

/// Aggregate sync status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Synced,
    Syncing,
    Pending,
    Conflict,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Syncing => "syncing",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "syncing" => Ok(Self::Syncing),
            "pending" => Ok(Self::Pending),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidInput(format!("unknown sync status '{other}'"))),
        }
    }
}

/// Sync status record, either global or for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// `"global"` or a resource id
    pub id: String,
    /// Last completed sync attempt (Unix ms)
    pub last_sync_at: Option<i64>,
    pub sync_status: SyncStatus,
    /// Unresolved conflict for this resource
    pub conflict_data: Option<ConflictInfo>,
}

impl SyncMetadata {
    /// Global record after a finished sync pass
    #[must_use]
    pub fn global(sync_status: SyncStatus, last_sync_at: i64) -> Self {
        Self {
            id: GLOBAL_SYNC_ID.to_string(),
            last_sync_at: Some(last_sync_at),
            sync_status,
            conflict_data: None,
        }
    }

    /// Per-resource record parking a detected conflict
    #[must_use]
    pub fn conflict(conflict: ConflictInfo) -> Self {
        Self {
            id: conflict.resource_id.clone(),
            last_sync_at: Some(conflict.timestamp),
            sync_status: SyncStatus::Conflict,
            conflict_data: Some(conflict),
        }
    }

    pub fn is_global(&self) -> bool {
        self.id == GLOBAL_SYNC_ID
    }
}
