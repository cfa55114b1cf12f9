pub mod common;
pub mod completions;
pub mod config;
pub mod conflicts;
pub mod content;
pub mod pending;
pub mod status;
pub mod sync;
