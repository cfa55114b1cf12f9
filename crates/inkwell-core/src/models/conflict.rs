//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ResourceType;
use crate::error::Error;

/// Divergence between local and server state for one resource.
///
/// Lives only while unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub local_content: String,
    pub server_content: String,
    pub local_version: i64,
    pub server_version: i64,
    /// Detection timestamp (Unix ms)
    pub timestamp: i64,
}

/// How a conflict gets resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Discard server content and resubmit the local text
    KeepLocal,
    /// Discard local content and adopt the server text
    KeepServer,
    /// Submit caller-supplied merged text
    Merge(String),
}

impl ConflictResolution {
    /// Text that becomes authoritative for this resolution
    pub fn resolved_text<'a>(&'a self, conflict: &'a ConflictInfo) -> &'a str {
        match self {
            Self::KeepLocal => &conflict.local_content,
            Self::KeepServer => &conflict.server_content,
            Self::Merge(text) => text,
        }
    }

    /// Whether the resolved text has to be submitted to the server
    pub const fn submits(&self) -> bool {
        !matches!(self, Self::KeepServer)
    }

    pub const fn strategy(&self) -> ResolutionStrategy {
        match self {
            Self::KeepLocal => ResolutionStrategy::KeepLocal,
            Self::KeepServer => ResolutionStrategy::KeepServer,
            Self::Merge(_) => ResolutionStrategy::Merge,
        }
    }
}

/// Resolution strategy name, without merge text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    KeepLocal,
    KeepServer,
    Merge,
}

impl ResolutionStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep-local",
            Self::KeepServer => "keep-server",
            Self::Merge => "merge",
        }
    }

    /// Attach merge text to build a full resolution.
    ///
    /// `merge` requires text; the other strategies ignore it.
    pub fn into_resolution(self, merged: Option<String>) -> crate::Result<ConflictResolution> {
        match (self, merged) {
            (Self::KeepLocal, _) => Ok(ConflictResolution::KeepLocal),
            (Self::KeepServer, _) => Ok(ConflictResolution::KeepServer),
            (Self::Merge, Some(text)) => Ok(ConflictResolution::Merge(text)),
            (Self::Merge, None) => Err(Error::InvalidInput(
                "merge resolution requires merged content".into(),
            )),
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "keep-local" => Ok(Self::KeepLocal),
            "keep-server" => Ok(Self::KeepServer),
            "merge" => Ok(Self::Merge),
            other => Err(Error::InvalidInput(format!(
                "unknown resolution strategy '{other}'"
            ))),
        }
    }
}
