//! Data models for Inkwell's offline sync

mod conflict;
mod content;
mod mutation;
mod notification;
mod pending_change;
mod sync_metadata;

pub use conflict::{ConflictInfo, ConflictResolution, ResolutionStrategy};
pub use content::CachedContent;
pub use mutation::{MutationKind, QueuedMutation};
pub use notification::{Notification, NotificationLevel};
pub use pending_change::{
    ChangeId, ChangeStatus, ChangeType, ContentSavePayload, PendingChange, ResourceType,
    MAX_RETRIES,
};
pub use sync_metadata::{SyncMetadata, SyncStatus, GLOBAL_SYNC_ID};
