use inkwell_core::models::ChangeId;

use crate::commands::common::{format_pending_lines, pending_to_item, PendingChangeItem, Session};
use crate::error::CliError;

pub async fn run_pending(session: &Session, as_json: bool) -> Result<(), CliError> {
    let changes = session.controller.store().pending_changes().await?;

    if as_json {
        let json_items = changes
            .iter()
            .map(pending_to_item)
            .collect::<Vec<PendingChangeItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if changes.is_empty() {
        println!("No pending changes.");
        return Ok(());
    }

    for line in format_pending_lines(&changes) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_retry(session: &Session) -> Result<usize, CliError> {
    let count = session.controller.retry_failed_changes().await?;
    if count == 0 {
        println!("No failed changes.");
    } else {
        println!("{count} failed change(s) will be retried on the next sync");
    }
    Ok(count)
}

pub async fn run_discard(session: &Session, change_id: &str) -> Result<(), CliError> {
    let trimmed = change_id.trim();
    let id = trimmed
        .parse::<ChangeId>()
        .map_err(|_| CliError::InvalidChangeId(trimmed.to_string()))?;

    if !session.controller.discard_change(&id).await? {
        return Err(CliError::ChangeNotFound(id.to_string()));
    }
    println!("Discarded change {id}");
    Ok(())
}
