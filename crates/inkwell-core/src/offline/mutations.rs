//! Fire-and-forget mutation queue for operations without a cached resource.
//!
//! Queued mutations live in the state projection only. Each failed replay
//! bumps the retry counter; a mutation that fails [`MAX_RETRIES`] times is
//! dropped with a single error notification.

use super::controller::OfflineController;
use crate::models::{ChangeId, MutationKind, Notification, QueuedMutation, MAX_RETRIES};
use crate::remote::MutationTransport;

/// Outcome of one replay of the mutation queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub failed: usize,
    /// Mutations dropped after exhausting their retries
    pub dropped: Vec<QueuedMutation>,
}

impl OfflineController {
    /// Queue a mutation for later replay
    pub fn queue_mutation(
        &self,
        kind: MutationKind,
        endpoint: impl Into<String>,
        payload: serde_json::Value,
    ) -> ChangeId {
        let mutation = QueuedMutation::new(kind, endpoint, payload);
        let id = mutation.id;
        tracing::debug!("Queued mutation {id}: {}", mutation.label());

        self.state.send_modify(|state| {
            state.pending_mutations.push(mutation);
            if state.conflicts.is_empty() && !state.is_syncing {
                state.sync_status = state.settled_status();
            }
        });
        id
    }

    /// Remove a mutation, returning whether it was queued
    pub fn remove_mutation(&self, id: &ChangeId) -> bool {
        self.state.send_if_modified(|state| {
            let before = state.pending_mutations.len();
            state.pending_mutations.retain(|mutation| mutation.id != *id);
            let removed = state.pending_mutations.len() != before;
            if removed && !state.is_syncing {
                state.sync_status = state.settled_status();
            }
            removed
        })
    }

    /// Record a failed attempt.
    ///
    /// Returns the mutation if this attempt used up its retries and it was dropped.
    pub fn increment_retry(&self, id: &ChangeId) -> Option<QueuedMutation> {
        let mut dropped = None;
        self.state.send_if_modified(|state| {
            let Some(index) = state
                .pending_mutations
                .iter()
                .position(|mutation| mutation.id == *id)
            else {
                return false;
            };

            let mutation = &mut state.pending_mutations[index];
            mutation.retry_count = mutation.retry_count.saturating_add(1);
            if mutation.retry_count >= MAX_RETRIES {
                dropped = Some(state.pending_mutations.remove(index));
                state.sync_status = state.settled_status();
            }
            true
        });

        if let Some(mutation) = &dropped {
            tracing::error!(
                "Dropping mutation {} after {} failed attempts",
                mutation.label(),
                mutation.retry_count
            );
            self.notify(Notification::error(
                "Change could not be synced",
                format!(
                    "{} failed {} times and was discarded.",
                    mutation.label(),
                    mutation.retry_count
                ),
            ));
        }
        dropped
    }

    /// Send every queued mutation in order.
    ///
    /// Does nothing while offline.
    pub async fn replay_mutations(&self, transport: &dyn MutationTransport) -> ReplayReport {
        let mut report = ReplayReport::default();
        if !self.is_online() {
            return report;
        }

        let queued = self.state.borrow().pending_mutations.clone();
        for mutation in queued {
            match transport.send(&mutation).await {
                Ok(()) => {
                    self.remove_mutation(&mutation.id);
                    report.replayed += 1;
                }
                Err(error) => {
                    tracing::warn!("Replay of {} failed: {error}", mutation.label());
                    report.failed += 1;
                    if let Some(dropped) = self.increment_retry(&mutation.id) {
                        report.dropped.push(dropped);
                    }
                }
            }
        }

        if report.replayed > 0 || report.failed > 0 {
            tracing::info!(
                "Replayed {} mutation(s), {} failed, {} dropped",
                report.replayed,
                report.failed,
                report.dropped.len()
            );
        }
        report
    }
}
