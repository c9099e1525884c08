// src/monitor/scheduler.rs

//! Recurring poll scheduling.
//!
//! One spawned task per tracked target. The task sleeps until the next
//! fire time, applies the quiet-hours gate, runs the poll handler, then
//! advances the schedule from the base interval. Because the loop awaits
//! the handler before computing the next fire, at most one invocation per
//! target is ever in flight; fires that came due while a poll was running
//! are coalesced into the next occurrence rather than queued.
//!
//! Job definitions are persisted through the [`TrackingStore`] so a
//! restart re-arms every job without the owning subject re-issuing track
//! requests. A fire missed across downtime is run once as a catch-up if it
//! is younger than the misfire grace window, and dropped otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{SchedulerConfig, Subject, TrackedTarget};
use crate::monitor::clock::{Clock, within_active_window};
use crate::storage::{JobRecord, TrackingStore};

/// Callback invoked on every allowed fire.
#[async_trait]
pub trait PollHandler: Send + Sync {
    /// Run one poll cycle. Errors are the handler's to log; a failed cycle
    /// leaves the job armed for its next interval.
    async fn poll(&self, subject: &Subject, url: &str);
}

/// Deterministic job key for a (subject, URL) pair.
///
/// Registering the same pair twice produces the same key, which makes
/// re-registration a replace instead of a duplicate.
pub fn job_key(subject: &Subject, url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    format!("{}_{}", subject, &digest[..12])
}

struct JobHandle {
    record: JobRecord,
    task: JoinHandle<()>,
}

/// Owns the recurring timer task for every tracked target.
pub struct JobScheduler {
    store: Arc<dyn TrackingStore>,
    clock: Arc<dyn Clock>,
    handler: Arc<dyn PollHandler>,
    config: SchedulerConfig,
    jobs: Mutex<HashMap<String, JobHandle>>,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        clock: Arc<dyn Clock>,
        handler: Arc<dyn PollHandler>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            handler,
            config,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Register a target and arm its job. Re-registering an already tracked
    /// URL replaces the job definition and keeps the target's poll history.
    ///
    /// Returns the effective interval after clamping to the configured
    /// minimum.
    pub async fn track(
        &self,
        subject: &Subject,
        url: &str,
        interval_minutes: u64,
        quiet_hours: bool,
    ) -> Result<u64> {
        url::Url::parse(url)?;
        let interval = interval_minutes.max(self.config.min_interval_minutes);

        let mut jobs = self.jobs.lock().await;

        let mut target = self
            .store
            .get(subject, url)
            .await?
            .unwrap_or_else(|| TrackedTarget::new(interval, quiet_hours));
        target.interval_minutes = interval;
        target.quiet_hours = quiet_hours;
        self.store.upsert(subject, url, target).await?;

        let key = job_key(subject, url);
        let record = JobRecord {
            subject: subject.clone(),
            url: url.to_string(),
            interval_minutes: interval,
            quiet_hours,
            next_fire_at: self.clock.now_utc() + Duration::minutes(interval as i64),
        };
        self.store.put_job(&key, record.clone()).await?;
        self.arm(&mut jobs, key, record);

        Ok(interval)
    }

    /// Cancel a target's job and remove its state. Both go together: the
    /// task is aborted and the records deleted under the jobs lock, so no
    /// caller can observe a timer without state or state without a timer.
    ///
    /// Returns false if the URL was not tracked.
    pub async fn untrack(&self, subject: &Subject, url: &str) -> Result<bool> {
        let key = job_key(subject, url);
        let mut jobs = self.jobs.lock().await;

        if let Some(handle) = jobs.remove(&key) {
            handle.task.abort();
        }
        let existed = self.store.remove(subject, url).await?;
        self.store.remove_job(&key).await?;
        Ok(existed)
    }

    /// Re-arm every persisted job after a restart.
    ///
    /// Job records whose target is gone (an untrack that failed partway)
    /// are discarded instead of armed. Returns the number of armed jobs.
    pub async fn restore(&self) -> Result<usize> {
        let persisted = self.store.load_jobs().await?;
        let mut jobs = self.jobs.lock().await;
        let mut armed = 0;

        for (key, mut record) in persisted {
            if self.store.get(&record.subject, &record.url).await?.is_none() {
                log::warn!("dropping orphan job record {key}");
                self.store.remove_job(&key).await?;
                continue;
            }

            record.next_fire_at = resolve_misfire(
                record.next_fire_at,
                self.clock.now_utc(),
                Duration::minutes(record.interval_minutes as i64),
                Duration::seconds(self.config.misfire_grace_secs as i64),
            );
            self.store.put_job(&key, record.clone()).await?;
            self.arm(&mut jobs, key, record);
            armed += 1;
        }

        log::info!("scheduler restored {armed} job(s)");
        Ok(armed)
    }

    /// Definitions of all currently armed jobs.
    pub async fn armed_jobs(&self) -> Vec<JobRecord> {
        let jobs = self.jobs.lock().await;
        jobs.values().map(|handle| handle.record.clone()).collect()
    }

    /// Abort every armed job task.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        for (_, handle) in jobs.drain() {
            handle.task.abort();
        }
    }

    /// Arm a job, replacing any existing task under the same key.
    fn arm(&self, jobs: &mut HashMap<String, JobHandle>, key: String, record: JobRecord) {
        if let Some(previous) = jobs.remove(&key) {
            previous.task.abort();
        }

        let task = tokio::spawn(job_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            Arc::clone(&self.handler),
            self.config.clone(),
            key.clone(),
            record.clone(),
        ));
        jobs.insert(key, JobHandle { record, task });
    }
}

/// The per-target timer loop. Runs until the task is aborted.
async fn job_loop(
    store: Arc<dyn TrackingStore>,
    clock: Arc<dyn Clock>,
    handler: Arc<dyn PollHandler>,
    config: SchedulerConfig,
    key: String,
    record: JobRecord,
) {
    let interval = Duration::minutes(record.interval_minutes as i64);
    let mut next_fire = record.next_fire_at;

    loop {
        let now = clock.now_utc();
        if next_fire > now {
            let wait = (next_fire - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
        }

        if record.quiet_hours
            && !within_active_window(
                clock.local_hour(),
                config.quiet_start_hour,
                config.quiet_end_hour,
            )
        {
            log::debug!("quiet hours: suppressing fire for {key}");
        } else {
            handler.poll(&record.subject, &record.url).await;
        }

        // Advance from the base interval; occurrences that came due while
        // the poll ran are coalesced into the next one.
        next_fire += interval;
        let now = clock.now_utc();
        while next_fire <= now {
            next_fire += interval;
        }

        let mut updated = record.clone();
        updated.next_fire_at = next_fire;
        if let Err(e) = store.put_job(&key, updated).await {
            log::warn!("failed to persist schedule for {key}: {e}");
        }
    }
}

/// Decide the first fire time for a job whose schedule may have lapsed
/// while the process was down.
///
/// A missed fire younger than `grace` is coalesced into one immediate
/// catch-up run; older misses are dropped and the schedule rolls forward
/// to the next future occurrence.
fn resolve_misfire(
    next_fire: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: Duration,
    grace: Duration,
) -> DateTime<Utc> {
    if next_fire > now {
        return next_fire;
    }
    if now - next_fire <= grace {
        return now;
    }
    let mut rolled = next_fire;
    while rolled <= now {
        rolled += interval;
    }
    rolled
}
