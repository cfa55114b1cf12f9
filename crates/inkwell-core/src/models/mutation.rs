//! Fire-and-forget mutation queue entries

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ChangeId;
use crate::util::now_millis;

/// HTTP-style operation a queued mutation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Un-cached mutation against an arbitrary endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: ChangeId,
    pub kind: MutationKind,
    /// Endpoint path relative to the API base, e.g. `/projects/p1/volumes`
    pub endpoint: String,
    pub payload: serde_json::Value,
    /// Enqueue timestamp (Unix ms)
    pub timestamp: i64,
    pub retry_count: u32,
}

impl QueuedMutation {
    #[must_use]
    pub fn new(kind: MutationKind, endpoint: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: ChangeId::new(),
            kind,
            endpoint: endpoint.into(),
            payload,
            timestamp: now_millis(),
            retry_count: 0,
        }
    }

    /// Short label used in user-facing failure notices
    pub fn label(&self) -> String {
        format!("{} {}", self.kind, self.endpoint)
    }
}
