//! Core library for rare drop assignment management on game server databases.

pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod export;
pub mod index;
pub mod inspect;
pub mod models;
pub mod planner;
pub mod probability;
pub mod progress;
pub mod region;
pub mod snapshot;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use config::{CategoryRate, GroupingStrategy, SyncConfig};
pub use engine::{Engine, RunHandle};
pub use error::{RareDropError, Result};
pub use inspect::DetectedConfig;
pub use models::{RareCategory, SyncSummary, TableCounts};
pub use planner::SyncPlan;
pub use progress::{ProgressEvent, ProgressReporter};
pub use snapshot::BackupStatus;
