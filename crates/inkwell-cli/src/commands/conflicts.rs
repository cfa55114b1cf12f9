use inkwell_core::models::ResolutionStrategy;

use crate::commands::common::{
    conflict_to_item, format_conflict_lines, normalize_chapter_id, resolve_content, ConflictItem,
    Session,
};
use crate::error::CliError;

pub fn run_conflicts(session: &Session, as_json: bool) -> Result<(), CliError> {
    let conflicts = session.controller.state().conflicts;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No unresolved conflicts.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_resolve(
    session: &mut Session,
    chapter: &str,
    strategy: ResolutionStrategy,
    content_parts: &[String],
) -> Result<(), CliError> {
    let chapter = normalize_chapter_id(chapter)?;
    let Some(conflict) = session.controller.state().conflict(&chapter).cloned() else {
        return Err(CliError::ConflictNotFound(chapter));
    };

    let merged = if strategy == ResolutionStrategy::Merge {
        Some(resolve_content(content_parts, &conflict.local_content)?)
    } else {
        None
    };
    let resolution = strategy.into_resolution(merged)?;

    // Resolution submits text, so it needs a service even when the choice is local.
    let service = session.service().ok_or(CliError::SyncNotConfigured)?;
    let resolved = session
        .controller
        .resolve_conflict(service, &chapter, resolution)
        .await;
    session.flush_notifications();

    if resolved? {
        println!("Resolved {chapter} with {strategy}");
        Ok(())
    } else {
        Err(CliError::ConflictNotFound(chapter))
    }
}

pub async fn run_dismiss(session: &mut Session, chapter: &str) -> Result<(), CliError> {
    let chapter = normalize_chapter_id(chapter)?;
    if !session.controller.dismiss_conflict(&chapter).await? {
        return Err(CliError::ConflictNotFound(chapter));
    }
    session.flush_notifications();
    println!("Dismissed conflict on {chapter}; its change stays queued");
    Ok(())
}
