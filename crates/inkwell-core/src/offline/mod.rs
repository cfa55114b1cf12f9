//! Offline State Controller and its collaborators.

mod auto_sync;
mod controller;
mod mutations;
mod optimistic;
mod state;

pub use auto_sync::spawn_auto_sync;
pub use controller::{OfflineController, SaveOutcome};
pub use mutations::ReplayReport;
pub use optimistic::{OptimisticUpdate, Rollback};
pub use state::OfflineState;
