#![forbid(unsafe_code)]

//! Core domain model and business logic for LevelUp.
//!
//! This crate provides:
//! - Domain types (exercises, session logs, progression state)
//! - Exercise catalog and metadata resolution
//! - Prescription planner and progression engine
//! - Local persistence and remote synchronization

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod meta;
pub mod prescription;
pub mod progression;
pub mod legacy;
pub mod snapshot;
pub mod store;
pub mod remote;
pub mod sync;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, load_catalog};
pub use config::Config;
pub use legacy::parse_workout_log;
pub use prescription::plan;
pub use progression::{apply_workout_result, seed_initial_load, LoadFeel, WorkoutOutcome};
pub use snapshot::{AppSnapshot, ImportError};
pub use store::{FileStore, KeyValueStore, LocalState, MemoryStore};
pub use remote::{DirRemoteStore, RemoteStore};
pub use sync::{merge_progressions, SyncCoordinator, SyncReport, SyncStatus};
