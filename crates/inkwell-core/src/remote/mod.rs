//! Remote collaborators consumed by the sync layer.
//!
//! The content service owns the authoritative chapter text and its version
//! counter. Implementations live outside the offline subsystem; the HTTP
//! client here talks to the studio API.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::QueuedMutation;
use crate::Result;

pub use http::HttpContentService;

/// Server-side chapter content and its version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerContent {
    pub content: String,
    pub version: i64,
}

/// Chapter content service
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Fetch current server content and version
    async fn get_chapter_content(&self, project_id: &str, chapter_id: &str)
        -> Result<ServerContent>;

    /// Save content, returning the new server version
    async fn save_chapter_content(
        &self,
        project_id: &str,
        chapter_id: &str,
        content: &str,
    ) -> Result<i64>;

    async fn create_chapter(
        &self,
        project_id: &str,
        chapter_id: &str,
        payload: &serde_json::Value,
    ) -> Result<()>;

    async fn update_chapter(
        &self,
        project_id: &str,
        chapter_id: &str,
        payload: &serde_json::Value,
    ) -> Result<()>;

    async fn delete_chapter(&self, project_id: &str, chapter_id: &str) -> Result<()>;
}

/// Delivery of fire-and-forget mutations
#[async_trait]
pub trait MutationTransport: Send + Sync {
    async fn send(&self, mutation: &QueuedMutation) -> Result<()>;
}
