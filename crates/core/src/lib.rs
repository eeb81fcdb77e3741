//! Core library: rule evaluation and matching, the movie catalog, the sync
//! orchestrator and its scheduler.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod mapping;
pub mod matcher;
pub mod pipeline;
pub mod rules;
pub mod scheduler;
pub mod sync;

pub use error::SyncError;
