use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use inkwell_core::config::ClientConfig;
use inkwell_core::db::LocalStore;
use inkwell_core::models::{
    CachedContent, ConflictInfo, Notification, NotificationLevel, PendingChange,
};
use inkwell_core::remote::HttpContentService;
use inkwell_core::util::excerpt;
use inkwell_core::{OfflineController, OfflineState, SyncExecutor, SyncReport};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::CliError;

/// An opened local store with its controller and optional remote service
pub struct Session {
    pub controller: Arc<OfflineController>,
    pub config: ClientConfig,
    service: Option<Arc<HttpContentService>>,
    notifications: broadcast::Receiver<Notification>,
}

impl Session {
    /// Open with the user's config file and environment
    pub async fn open(db_path: &Path, offline: bool) -> Result<Self, CliError> {
        let config = ClientConfig::load()?;
        Self::open_with_config(db_path, config, offline).await
    }

    pub async fn open_with_config(
        db_path: &Path,
        config: ClientConfig,
        offline: bool,
    ) -> Result<Self, CliError> {
        let store = Arc::new(LocalStore::new(db_path));
        store.init().await?;

        let service = match config.api_base_url.clone() {
            Some(url) => Some(Arc::new(HttpContentService::new(
                url,
                config.api_token.clone(),
            )?)),
            None => None,
        };
        let is_online = !offline && !config.start_offline && service.is_some();

        let controller = Arc::new(OfflineController::new(store, is_online));
        let notifications = controller.notifications();
        controller.hydrate().await?;

        Ok(Self {
            controller,
            config,
            service,
            notifications,
        })
    }

    pub fn service(&self) -> Option<&HttpContentService> {
        self.service.as_deref()
    }

    /// Executor for sync passes; requires a configured and reachable service
    pub fn executor(&self) -> Result<SyncExecutor, CliError> {
        let service = self.service.clone().ok_or(CliError::SyncNotConfigured)?;
        if !self.controller.is_online() {
            return Err(CliError::Offline);
        }
        Ok(SyncExecutor::new(service))
    }

    pub fn transport(&self) -> Option<Arc<HttpContentService>> {
        self.service.clone()
    }

    /// Print notifications raised so far to stderr
    pub fn flush_notifications(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            eprintln!("{}", format_notification(&notification));
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PendingChangeItem {
    pub id: String,
    pub change_type: String,
    pub resource_id: String,
    pub project_id: String,
    pub status: String,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub queued_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub resource_id: String,
    pub resource_type: String,
    pub local_version: i64,
    pub server_version: i64,
    pub local_preview: String,
    pub server_preview: String,
    pub detected_at: i64,
    pub detected_at_iso: String,
}

pub fn pending_to_item(change: &PendingChange) -> PendingChangeItem {
    let now_ms = Utc::now().timestamp_millis();
    PendingChangeItem {
        id: change.id.to_string(),
        change_type: change.change_type.to_string(),
        resource_id: change.resource_id.clone(),
        project_id: change.project_id.clone(),
        status: change.status.to_string(),
        retry_count: change.retry_count,
        error_message: change.error_message.clone(),
        queued_at: change.timestamp,
        relative_time: format_relative_time(change.timestamp, now_ms),
    }
}

pub fn conflict_to_item(conflict: &ConflictInfo) -> ConflictItem {
    ConflictItem {
        resource_id: conflict.resource_id.clone(),
        resource_type: conflict.resource_type.to_string(),
        local_version: conflict.local_version,
        server_version: conflict.server_version,
        local_preview: excerpt(&conflict.local_content, 80),
        server_preview: excerpt(&conflict.server_content, 80),
        detected_at: conflict.timestamp,
        detected_at_iso: format_sync_timestamp(conflict.timestamp),
    }
}

pub fn format_pending_lines(changes: &[PendingChange]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    changes
        .iter()
        .map(|change| {
            let id = change.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let relative_time = format_relative_time(change.timestamp, now_ms);
            let line = format!(
                "{short_id:<13}  {:<14}  {:<20}  {:<8}  {relative_time}",
                change.change_type.to_string(),
                change.resource_id,
                change.status.to_string()
            );

            match &change.error_message {
                Some(error) if change.retry_count > 0 => {
                    format!("{line}  retries={} error={error}", change.retry_count)
                }
                _ => line,
            }
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[ConflictInfo]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  chapter={}  local=v{} \"{}\"  server=v{} \"{}\"",
                format_sync_timestamp(conflict.timestamp),
                conflict.resource_id,
                conflict.local_version,
                excerpt(&conflict.local_content, 30),
                conflict.server_version,
                excerpt(&conflict.server_content, 30)
            )
        })
        .collect()
}

pub fn format_content(content: &CachedContent) -> String {
    let server_version = content
        .server_version
        .map_or_else(|| "never synced".to_string(), |version| format!("server v{version}"));
    let state = if content.is_dirty { "unsynced" } else { "synced" };
    format!(
        "{} ({}, local v{}, {server_version}, {state})\n\n{}",
        content.id, content.project_id, content.local_version, content.content
    )
}

pub fn format_status_lines(state: &OfflineState) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Connection:      {}",
            if state.is_online { "online" } else { "offline" }
        ),
        format!("Sync status:     {}", state.sync_status),
        format!("Pending changes: {}", state.pending_changes_count),
        format!("Conflicts:       {}", state.conflicts.len()),
    ];
    lines.push(format!(
        "Last sync:       {}",
        state
            .last_sync_at
            .map_or_else(|| "never".to_string(), format_sync_timestamp)
    ));
    if let Some(error) = &state.sync_error {
        lines.push(format!("Last error:      {error}"));
    }
    lines
}

pub fn format_report(report: &SyncReport) -> String {
    if report.is_empty() && report.blocked_count == 0 {
        return "Nothing to sync".to_string();
    }

    let mut summary = format!(
        "Sync finished: {} synced, {} failed, {} conflict(s)",
        report.success_count,
        report.fail_count,
        report.conflicts.len()
    );
    if report.blocked_count > 0 {
        summary.push_str(&format!(", {} waiting on conflicts", report.blocked_count));
    }
    if report.stalled_count > 0 {
        summary.push_str(&format!(", {} still failing", report.stalled_count));
    }
    if !report.exhausted.is_empty() {
        summary.push_str(&format!("; gave up on {}", report.exhausted.join(", ")));
    }
    summary
}

pub fn format_notification(notification: &Notification) -> String {
    let level = match notification.level {
        NotificationLevel::Success => "ok",
        NotificationLevel::Info => "info",
        NotificationLevel::Warning => "warning",
        NotificationLevel::Error => "error",
    };
    format!("[{level}] {}: {}", notification.title, notification.message)
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn normalize_chapter_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyChapterId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Content from arguments, then piped stdin, then the user's editor
pub fn resolve_content(content_parts: &[String], initial: &str) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input(initial)? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

/// Reject blank input and keep everything else exactly as written
pub fn normalize_content(content: &str) -> Option<String> {
    (!content.trim().is_empty()).then(|| content.to_string())
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input(initial_content: &str) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_chapter_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        ))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let status = Command::new(program).args(parts).arg(file_path).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_chapter_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("inkwell-chapter-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("INKWELL_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("inkwell").join("inkwell.db"))
        .ok_or_else(|| CliError::Config("failed to resolve the user data directory".to_string()))
}
