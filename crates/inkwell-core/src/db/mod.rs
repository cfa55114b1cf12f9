//! Database layer for Inkwell's local store

mod connection;
mod migrations;
mod record;
mod store;

pub use connection::{Database, StoreLocation};
pub use record::{ContentIndex, MetadataIndex, PendingIndex, Record, StoreName};
pub use store::{LocalStore, StoreBatch, StoreEvent};
