//! Background sync scheduler.
//!
//! Runs a sync pass on a fixed interval and right after connectivity returns,
//! replaying queued mutations when a transport is configured.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::controller::OfflineController;
use crate::remote::MutationTransport;
use crate::sync::SyncExecutor;

/// Spawn the auto-sync loop.
///
/// The task exits when `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_auto_sync(
    controller: Arc<OfflineController>,
    executor: SyncExecutor,
    transport: Option<Arc<dyn MutationTransport>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut state = controller.subscribe();
        let mut was_online = state.borrow_and_update().is_online;

        tracing::info!("Auto-sync started: interval={}s", interval.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let is_online = state.borrow_and_update().is_online;
                    let reconnected = is_online && !was_online;
                    was_online = is_online;
                    if !reconnected {
                        continue;
                    }
                    tracing::debug!("Connectivity restored, syncing now");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if !controller.is_online() {
                continue;
            }
            if let Some(transport) = transport.as_deref() {
                controller.replay_mutations(transport).await;
            }
            if let Err(error) = controller.sync_pending_changes(&executor).await {
                tracing::warn!("Scheduled sync pass failed: {error}");
            }
        }

        tracing::info!("Auto-sync stopped");
    })
}
