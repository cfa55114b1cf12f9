//! Row mapping for the three logical stores

use libsql::{Row, Value};
use std::fmt;

use crate::error::{Error, Result};
use crate::models::{
    CachedContent, ChangeId, ChangeStatus, ConflictInfo, PendingChange, SyncMetadata, SyncStatus,
};

/// The logical stores backed by the local database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreName {
    EditorContent,
    PendingChanges,
    SyncMetadata,
}

impl StoreName {
    /// Backing table name
    pub const fn table(self) -> &'static str {
        match self {
            Self::EditorContent => "editor_content",
            Self::PendingChanges => "pending_changes",
            Self::SyncMetadata => "sync_metadata",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A record type stored in one of the logical stores, keyed by a string `id`.
pub trait Record: Sized + Send + Sync {
    /// Secondary index lookups supported by this store
    type Index: Send + Sync;

    const STORE: StoreName;
    /// Column list, primary key `id` first
    const COLUMNS: &'static [&'static str];
    /// Ordering used by `get_all` and index lookups
    const ORDER_BY: &'static str;

    fn key(&self) -> String;

    /// Column values in `COLUMNS` order
    fn to_values(&self) -> Result<Vec<Value>>;

    fn from_row(row: &Row) -> Result<Self>;

    /// Column and value an index lookup filters on
    fn index_filter(index: &Self::Index) -> (&'static str, Value);
}

/// Secondary indexes of the content cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentIndex {
    ProjectId(String),
    IsDirty(bool),
}

/// Secondary indexes of the pending change queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingIndex {
    ProjectId(String),
    ResourceId(String),
    Status(ChangeStatus),
}

/// Secondary indexes of the sync metadata store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataIndex {
    SyncStatus(SyncStatus),
}

fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn optional_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

impl Record for CachedContent {
    type Index = ContentIndex;

    const STORE: StoreName = StoreName::EditorContent;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "project_id",
        "content",
        "local_version",
        "server_version",
        "last_modified",
        "is_dirty",
    ];
    const ORDER_BY: &'static str = "last_modified DESC, id ASC";

    fn key(&self) -> String {
        self.id.clone()
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.id.clone()),
            Value::Text(self.project_id.clone()),
            Value::Text(self.content.clone()),
            Value::Integer(self.local_version),
            optional_integer(self.server_version),
            Value::Integer(self.last_modified),
            Value::Integer(i64::from(self.is_dirty)),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            content: row.get(2)?,
            local_version: row.get(3)?,
            server_version: row.get::<Option<i64>>(4)?,
            last_modified: row.get(5)?,
            is_dirty: row.get::<i64>(6)? != 0,
        })
    }

    fn index_filter(index: &Self::Index) -> (&'static str, Value) {
        match index {
            ContentIndex::ProjectId(project_id) => ("project_id", Value::Text(project_id.clone())),
            ContentIndex::IsDirty(dirty) => ("is_dirty", Value::Integer(i64::from(*dirty))),
        }
    }
}

impl Record for PendingChange {
    type Index = PendingIndex;

    const STORE: StoreName = StoreName::PendingChanges;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "change_type",
        "resource_type",
        "resource_id",
        "project_id",
        "payload",
        "timestamp",
        "retry_count",
        "status",
        "error_message",
    ];
    // UUID v7 ids break timestamp ties in creation order.
    const ORDER_BY: &'static str = "timestamp ASC, id ASC";

    fn key(&self) -> String {
        self.id.as_str()
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.id.as_str()),
            Value::Text(self.change_type.as_str().to_string()),
            Value::Text(self.resource_type.as_str().to_string()),
            Value::Text(self.resource_id.clone()),
            Value::Text(self.project_id.clone()),
            Value::Text(serde_json::to_string(&self.payload)?),
            Value::Integer(self.timestamp),
            Value::Integer(i64::from(self.retry_count)),
            Value::Text(self.status.as_str().to_string()),
            optional_text(self.error_message.clone()),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        let id: String = row.get(0)?;
        let change_type: String = row.get(1)?;
        let resource_type: String = row.get(2)?;
        let payload: String = row.get(5)?;
        let retry_count: i64 = row.get(7)?;
        let status: String = row.get(8)?;

        Ok(Self {
            id: id
                .parse::<ChangeId>()
                .map_err(|_| Error::Database(format!("invalid change id '{id}'")))?,
            change_type: change_type.parse()?,
            resource_type: resource_type.parse()?,
            resource_id: row.get(3)?,
            project_id: row.get(4)?,
            payload: serde_json::from_str(&payload)?,
            timestamp: row.get(6)?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            status: status.parse()?,
            error_message: row.get::<Option<String>>(9)?,
        })
    }

    fn index_filter(index: &Self::Index) -> (&'static str, Value) {
        match index {
            PendingIndex::ProjectId(project_id) => ("project_id", Value::Text(project_id.clone())),
            PendingIndex::ResourceId(resource_id) => {
                ("resource_id", Value::Text(resource_id.clone()))
            }
            PendingIndex::Status(status) => ("status", Value::Text(status.as_str().to_string())),
        }
    }
}

impl Record for SyncMetadata {
    type Index = MetadataIndex;

    const STORE: StoreName = StoreName::SyncMetadata;
    const COLUMNS: &'static [&'static str] = &["id", "last_sync_at", "sync_status", "conflict_data"];
    const ORDER_BY: &'static str = "id ASC";

    fn key(&self) -> String {
        self.id.clone()
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        let conflict_data = self
            .conflict_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(vec![
            Value::Text(self.id.clone()),
            optional_integer(self.last_sync_at),
            Value::Text(self.sync_status.as_str().to_string()),
            optional_text(conflict_data),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        let status: String = row.get(2)?;
        let conflict_data = row
            .get::<Option<String>>(3)?
            .map(|raw| serde_json::from_str::<ConflictInfo>(&raw))
            .transpose()?;

        Ok(Self {
            id: row.get(0)?,
            last_sync_at: row.get::<Option<i64>>(1)?,
            sync_status: status.parse()?,
            conflict_data,
        })
    }

    fn index_filter(index: &Self::Index) -> (&'static str, Value) {
        match index {
            MetadataIndex::SyncStatus(status) => {
                ("sync_status", Value::Text(status.as_str().to_string()))
            }
        }
    }
}
