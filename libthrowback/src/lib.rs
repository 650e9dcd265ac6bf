//! Throwback - pick an album that has rested long enough and post it
//!
//! This library holds everything the `throwback-post` binary does: manifest
//! and history loading, eligibility filtering, seeded selection, caption
//! rendering, and publishing to Twitter/X and Bluesky.

pub mod auth;
pub mod caption;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod history;
pub mod logging;
pub mod manifest;
pub mod media;
pub mod platforms;
pub mod poster;
pub mod selector;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, ThrowbackError};
pub use history::HistoryLedger;
pub use poster::{PublishOrchestrator, RunOptions, RunReport};
pub use types::{HistoryRecord, Platform, PlatformSelection, ThrowbackSet};
