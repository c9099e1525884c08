// src/models/mod.rs

//! Domain models for the monitoring engine.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod file;
mod target;

// Re-export all public types
pub use config::{Config, FetchConfig, LoggingConfig, MonitorConfig, SchedulerConfig, StorageConfig};
pub use file::{ExtractedFile, FetchedFile, FileKind};
pub use target::{Subject, TrackedTarget};
