//! Durable state for tracked targets and scheduled jobs.
//!
//! Two records survive restarts:
//! - the tracking table: subject → URL → [`TrackedTarget`]
//! - the job table: deterministic job key → [`JobRecord`]
//!
//! Every mutation flushes to disk before returning. A crash after delivery
//! but before the flush means at-least-once redelivery on the next cycle,
//! never a lost record of a delivered file.
//!
//! ## Storage Layout
//!
//! ```text
//! {data_dir}/
//! ├── targets.json          # subject → url → monitoring state
//! └── jobs.json             # job key → schedule definition
//! ```

pub mod local;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Subject, TrackedTarget};

// Re-export for convenience
pub use local::JsonStore;

/// Persisted definition of one recurring poll job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Owning subject
    pub subject: Subject,

    /// Tracked page URL
    pub url: String,

    /// Base recurrence interval in minutes
    pub interval_minutes: u64,

    /// Whether fires are gated by the quiet-hours window
    pub quiet_hours: bool,

    /// Next scheduled fire time; in the past after downtime
    pub next_fire_at: DateTime<Utc>,
}

/// Durable mapping of subjects to tracked URLs and their state, plus the
/// scheduler's job table.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Look up one tracked target.
    async fn get(&self, subject: &Subject, url: &str) -> Result<Option<TrackedTarget>>;

    /// Insert or replace a tracked target.
    async fn upsert(&self, subject: &Subject, url: &str, target: TrackedTarget) -> Result<()>;

    /// Remove a tracked target. Returns false if it did not exist.
    async fn remove(&self, subject: &Subject, url: &str) -> Result<bool>;

    /// All targets owned by a subject, as (url, target) pairs.
    async fn list_by_subject(&self, subject: &Subject) -> Result<Vec<(String, TrackedTarget)>>;

    /// Record the outcome of a poll cycle in one durable update: the new
    /// fingerprint, and `newly_seen` merged into the seen set (which never
    /// shrinks). Returns false without writing if the target vanished.
    async fn update_after_poll(
        &self,
        subject: &Subject,
        url: &str,
        fingerprint: &str,
        newly_seen: &BTreeSet<String>,
    ) -> Result<bool>;

    /// Load the full job table.
    async fn load_jobs(&self) -> Result<Vec<(String, JobRecord)>>;

    /// Insert or replace a job record.
    async fn put_job(&self, key: &str, record: JobRecord) -> Result<()>;

    /// Remove a job record if present.
    async fn remove_job(&self, key: &str) -> Result<()>;
}
