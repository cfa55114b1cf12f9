use std::sync::Arc;
use std::time::Duration;

use inkwell_core::offline::spawn_auto_sync;
use inkwell_core::remote::MutationTransport;
use inkwell_core::SyncReport;
use tokio::sync::watch;

use crate::commands::common::{format_report, Session};
use crate::error::CliError;

pub async fn run_sync(session: &mut Session) -> Result<Option<SyncReport>, CliError> {
    let executor = session.executor()?;
    let report = session.controller.sync_pending_changes(&executor).await?;
    session.flush_notifications();

    match &report {
        Some(report) => println!("{}", format_report(report)),
        None => println!("A sync pass is already running"),
    }
    Ok(report)
}

pub async fn run_watch(session: &mut Session, interval_secs: Option<u64>) -> Result<(), CliError> {
    let executor = session.executor()?;
    let interval = interval_secs.map_or_else(
        || session.config.auto_sync_interval(),
        Duration::from_secs,
    );
    if interval.is_zero() {
        return Err(CliError::Config("sync interval must be positive".to_string()));
    }

    let transport = session
        .transport()
        .map(|service| service as Arc<dyn MutationTransport>);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_auto_sync(
        Arc::clone(&session.controller),
        executor,
        transport,
        interval,
        shutdown_rx,
    );

    println!(
        "Syncing every {}s. Press Ctrl-C to stop.",
        interval.as_secs()
    );

    let mut notifications = session.controller.notifications();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            notification = notifications.recv() => {
                if let Ok(notification) = notification {
                    eprintln!("{}", crate::commands::common::format_notification(&notification));
                }
            }
        }
    }

    shutdown_tx.send_replace(true);
    if let Err(error) = handle.await {
        tracing::warn!("Auto-sync task ended abnormally: {error}");
    }
    println!("Stopped");
    Ok(())
}
