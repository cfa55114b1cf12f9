//! Pending change model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;
use crate::util::now_millis;

/// Failed attempts after which a change is reported as failed
pub const MAX_RETRIES: u32 = 3;

/// A unique identifier for a queued change, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeId(Uuid);

impl ChangeId {
    /// Create a new unique change ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    ContentSave,
    ChapterCreate,
    ChapterUpdate,
    ChapterDelete,
}

/// Kind of resource a change targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Chapter,
    Volume,
    Project,
}

/// Delivery status of a queued change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Pending,
    Syncing,
    Failed,
}

macro_rules! string_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Stable storage representation
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "unknown {} '{other}'",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

string_enum!(ChangeType {
    ContentSave => "CONTENT_SAVE",
    ChapterCreate => "CHAPTER_CREATE",
    ChapterUpdate => "CHAPTER_UPDATE",
    ChapterDelete => "CHAPTER_DELETE",
});

string_enum!(ResourceType {
    Chapter => "chapter",
    Volume => "volume",
    Project => "project",
});

string_enum!(ChangeStatus {
    Pending => "pending",
    Syncing => "syncing",
    Failed => "failed",
});

/// Payload of a `CONTENT_SAVE` change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSavePayload {
    /// Text to submit
    pub content: String,
    /// Local version of the cache record this save captured
    pub local_version: i64,
}

/// One queued mutation awaiting network application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: ChangeId,
    pub change_type: ChangeType,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub project_id: String,
    /// Type-specific payload
    pub payload: serde_json::Value,
    /// Enqueue timestamp (Unix ms)
    pub timestamp: i64,
    pub retry_count: u32,
    pub status: ChangeStatus,
    pub error_message: Option<String>,
}

impl PendingChange {
    /// Create a new pending change
    #[must_use]
    pub fn new(
        change_type: ChangeType,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        project_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: ChangeId::new(),
            change_type,
            resource_type,
            resource_id: resource_id.into(),
            project_id: project_id.into(),
            payload,
            timestamp: now_millis(),
            retry_count: 0,
            status: ChangeStatus::Pending,
            error_message: None,
        }
    }

    /// Create a `CONTENT_SAVE` change for a chapter
    pub fn content_save(
        chapter_id: impl Into<String>,
        project_id: impl Into<String>,
        payload: &ContentSavePayload,
    ) -> crate::Result<Self> {
        Ok(Self::new(
            ChangeType::ContentSave,
            ResourceType::Chapter,
            chapter_id,
            project_id,
            serde_json::to_value(payload)?,
        ))
    }

    /// Decode the payload of a `CONTENT_SAVE` change
    pub fn content_payload(&self) -> crate::Result<ContentSavePayload> {
        if self.change_type != ChangeType::ContentSave {
            return Err(Error::InvalidInput(format!(
                "change {} is {}, not {}",
                self.id,
                self.change_type,
                ChangeType::ContentSave
            )));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Whether the retry budget has been used up
    pub const fn is_exhausted(&self) -> bool {
        self.retry_count >= MAX_RETRIES
    }

    /// Record a failed attempt.
    ///
    /// Once the retry budget is spent the change is marked `Failed`. It stays
    /// queued and later passes still attempt it.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.error_message = Some(message.into());
        self.status = if self.is_exhausted() {
            ChangeStatus::Failed
        } else {
            ChangeStatus::Pending
        };
    }

    /// Give the change a fresh retry budget
    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
        self.status = ChangeStatus::Pending;
        self.error_message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_roundtrips_storage_text() {
        for change_type in [
            ChangeType::ContentSave,
            ChangeType::ChapterCreate,
            ChangeType::ChapterUpdate,
            ChangeType::ChapterDelete,
        ] {
            let parsed: ChangeType = change_type.as_str().parse().unwrap();
            assert_eq!(parsed, change_type);
        }
        assert!("RENAME".parse::<ChangeType>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ChangeType::ContentSave).unwrap();
        assert_eq!(json, "\"CONTENT_SAVE\"");
        let json = serde_json::to_string(&ChangeStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
    }

    #[test]
    fn content_payload_roundtrip() {
        let payload = ContentSavePayload {
            content: "Hello".into(),
            local_version: 3,
        };
        let change = PendingChange::content_save("c1", "p1", &payload).unwrap();
        assert_eq!(change.status, ChangeStatus::Pending);
        assert_eq!(change.content_payload().unwrap(), payload);
    }

    #[test]
    fn content_payload_rejects_other_types() {
        let change = PendingChange::new(
            ChangeType::ChapterDelete,
            ResourceType::Chapter,
            "c1",
            "p1",
            serde_json::Value::Null,
        );
        assert!(change.content_payload().is_err());
    }

    #[test]
    fn record_failure_caps_retries() {
        let mut change = PendingChange::new(
            ChangeType::ChapterCreate,
            ResourceType::Chapter,
            "c1",
            "p1",
            serde_json::json!({ "title": "One" }),
        );

        change.record_failure("offline");
        assert_eq!(change.status, ChangeStatus::Pending);
        change.record_failure("offline");
        assert_eq!(change.status, ChangeStatus::Pending);
        change.record_failure("offline");
        assert_eq!(change.status, ChangeStatus::Failed);
        assert!(change.is_exhausted());
        assert_eq!(change.error_message.as_deref(), Some("offline"));

        change.reset_retries();
        assert_eq!(change.status, ChangeStatus::Pending);
        assert_eq!(change.retry_count, 0);
        assert!(change.error_message.is_none());
    }
}
