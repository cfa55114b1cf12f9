use inkwell_core::SaveOutcome;

use crate::commands::common::{format_content, normalize_chapter_id, resolve_content, Session};
use crate::error::CliError;

pub async fn run_save(
    session: &mut Session,
    chapter: &str,
    project: &str,
    content_parts: &[String],
) -> Result<SaveOutcome, CliError> {
    let chapter = normalize_chapter_id(chapter)?;
    let project = normalize_chapter_id(project)?;
    let initial = session
        .controller
        .get_cached_content(&chapter)
        .await?
        .map(|cached| cached.content)
        .unwrap_or_default();
    let content = resolve_content(content_parts, &initial)?;

    let outcome = match session.service() {
        Some(service) if session.controller.is_online() => {
            session
                .controller
                .save_content(service, &chapter, &project, &content)
                .await?
        }
        _ => SaveOutcome::Queued(
            session
                .controller
                .queue_content_save(&chapter, &project, &content)
                .await?,
        ),
    };
    session.flush_notifications();

    match &outcome {
        SaveOutcome::Saved { version } => println!("Saved {chapter} at version {version}"),
        SaveOutcome::Queued(id) => println!("Queued {chapter} for sync ({id})"),
        SaveOutcome::Conflict(conflict) => println!(
            "Conflict on {chapter}: server is at version {}. Run `inkwell resolve {chapter}`.",
            conflict.server_version
        ),
    }
    Ok(outcome)
}

pub async fn run_show(
    session: &mut Session,
    chapter: &str,
    project: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let chapter = normalize_chapter_id(chapter)?;
    let cached = match (session.service(), project) {
        (Some(service), Some(project)) => {
            session
                .controller
                .load_chapter(service, project, &chapter)
                .await?
        }
        _ => session.controller.get_cached_content(&chapter).await?,
    };
    session.flush_notifications();

    let Some(cached) = cached else {
        return Err(CliError::ChapterNotFound(chapter));
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&cached)?);
    } else {
        println!("{}", format_content(&cached));
    }
    Ok(())
}
