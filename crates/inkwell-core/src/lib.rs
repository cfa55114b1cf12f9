//! inkwell-core - Offline sync core for Inkwell
//!
//! This crate contains the local store, the pending change queue, the sync
//! executor, and the offline state controller used by Inkwell front ends.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod offline;
pub mod remote;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use offline::{OfflineController, OfflineState, SaveOutcome};
pub use sync::{SyncExecutor, SyncReport};
