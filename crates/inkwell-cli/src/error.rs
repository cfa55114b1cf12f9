use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] inkwell_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No content provided")]
    EmptyContent,
    #[error("Chapter ID cannot be empty")]
    EmptyChapterId,
    #[error("Chapter not cached: {0}")]
    ChapterNotFound(String),
    #[error("Invalid change ID: {0}")]
    InvalidChangeId(String),
    #[error("No queued change with ID {0}")]
    ChangeNotFound(String),
    #[error("No conflict recorded for chapter {0}")]
    ConflictNotFound(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync is not configured. Run `inkwell config init --api-url <URL>` or set INKWELL_API_URL.")]
    SyncNotConfigured,
    #[error("Sync is unavailable while offline")]
    Offline,
}
