//! JSON file store implementation.
//!
//! Read-modify-write over two JSON documents with atomic replacement
//! (write to temp, then rename). An internal mutex serializes mutations so
//! cycles completing near-simultaneously for different targets cannot lose
//! updates to each other.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Subject, TrackedTarget};
use crate::storage::{JobRecord, TrackingStore};

const TARGETS_FILE: &str = "targets.json";
const JOBS_FILE: &str = "jobs.json";

/// Nested tracking table as serialized: subject → url → state.
type TargetTable = BTreeMap<String, BTreeMap<String, TrackedTarget>>;

/// Job table as serialized: job key → definition.
type JobTable = BTreeMap<String, JobRecord>;

/// Local filesystem store backend.
pub struct JsonStore {
    root_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Create a new JsonStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read JSON data, returning None if the file doesn't exist.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn load_targets(&self) -> Result<TargetTable> {
        Ok(self.read_json(TARGETS_FILE).await?.unwrap_or_default())
    }

    async fn load_job_table(&self) -> Result<JobTable> {
        Ok(self.read_json(JOBS_FILE).await?.unwrap_or_default())
    }
}

#[async_trait]
impl TrackingStore for JsonStore {
    async fn get(&self, subject: &Subject, url: &str) -> Result<Option<TrackedTarget>> {
        let table = self.load_targets().await?;
        Ok(table
            .get(subject.as_str())
            .and_then(|targets| targets.get(url))
            .cloned())
    }

    async fn upsert(&self, subject: &Subject, url: &str, target: TrackedTarget) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.load_targets().await?;
        table
            .entry(subject.as_str().to_string())
            .or_default()
            .insert(url.to_string(), target);
        self.write_json(TARGETS_FILE, &table).await
    }

    async fn remove(&self, subject: &Subject, url: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.load_targets().await?;
        let Some(targets) = table.get_mut(subject.as_str()) else {
            return Ok(false);
        };
        let existed = targets.remove(url).is_some();
        if !existed {
            return Ok(false);
        }
        if targets.is_empty() {
            table.remove(subject.as_str());
        }
        self.write_json(TARGETS_FILE, &table).await?;
        Ok(true)
    }

    async fn list_by_subject(&self, subject: &Subject) -> Result<Vec<(String, TrackedTarget)>> {
        let table = self.load_targets().await?;
        Ok(table
            .get(subject.as_str())
            .map(|targets| {
                targets
                    .iter()
                    .map(|(url, target)| (url.clone(), target.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_after_poll(
        &self,
        subject: &Subject,
        url: &str,
        fingerprint: &str,
        newly_seen: &BTreeSet<String>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.load_targets().await?;
        let Some(target) = table
            .get_mut(subject.as_str())
            .and_then(|targets| targets.get_mut(url))
        else {
            // Untracked while the cycle was in flight
            return Ok(false);
        };

        target.fingerprint = fingerprint.to_string();
        target.seen_files.extend(newly_seen.iter().cloned());

        self.write_json(TARGETS_FILE, &table).await?;
        Ok(true)
    }

    async fn load_jobs(&self) -> Result<Vec<(String, JobRecord)>> {
        let table = self.load_job_table().await?;
        Ok(table.into_iter().collect())
    }

    async fn put_job(&self, key: &str, record: JobRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.load_job_table().await?;
        table.insert(key.to_string(), record);
        self.write_json(JOBS_FILE, &table).await
    }

    async fn remove_job(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.load_job_table().await?;
        if table.remove(key).is_some() {
            self.write_json(JOBS_FILE, &table).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn subject() -> Subject {
        Subject::from("chat-1")
    }

    #[tokio::test]
    async fn test_get_missing_target() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path());

        let target = store.get(&subject(), "https://example.com").await.unwrap();
        assert!(target.is_none());
    }

    #[tokio::test]
    async fn test_upsert_and_reload() {
        let tmp = TempDir::new().unwrap();
        let url = "https://example.com/news";

        {
            let store = JsonStore::new(tmp.path());
            store
                .upsert(&subject(), url, TrackedTarget::new(30, true))
                .await
                .unwrap();
        }

        // A fresh store over the same directory sees the flushed state
        let store = JsonStore::new(tmp.path());
        let target = store.get(&subject(), url).await.unwrap().unwrap();
        assert_eq!(target.interval_minutes, 30);
        assert!(target.quiet_hours);
    }

    #[tokio::test]
    async fn test_remove() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path());
        let url = "https://example.com";

        store
            .upsert(&subject(), url, TrackedTarget::new(10, false))
            .await
            .unwrap();

        assert!(store.remove(&subject(), url).await.unwrap());
        assert!(!store.remove(&subject(), url).await.unwrap());
        assert!(store.get(&subject(), url).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_subject() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path());

        store
            .upsert(&subject(), "https://a.example", TrackedTarget::new(5, false))
            .await
            .unwrap();
        store
            .upsert(&subject(), "https://b.example", TrackedTarget::new(10, true))
            .await
            .unwrap();
        store
            .upsert(
                &Subject::from("other"),
                "https://c.example",
                TrackedTarget::new(15, false),
            )
            .await
            .unwrap();

        let listed = store.list_by_subject(&subject()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "https://a.example");
        assert_eq!(listed[1].0, "https://b.example");
    }

    #[tokio::test]
    async fn test_update_after_poll_merges_seen() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path());
        let url = "https://example.com";

        let mut initial = TrackedTarget::new(5, false);
        initial.seen_files.insert("https://example.com/a.pdf".into());
        store.upsert(&subject(), url, initial).await.unwrap();

        let newly: BTreeSet<String> = ["https://example.com/b.pdf".to_string()].into();
        assert!(
            store
                .update_after_poll(&subject(), url, "abc123", &newly)
                .await
                .unwrap()
        );

        let target = store.get(&subject(), url).await.unwrap().unwrap();
        assert_eq!(target.fingerprint, "abc123");
        assert_eq!(target.seen_files.len(), 2);
        assert!(target.seen_files.contains("https://example.com/a.pdf"));
        assert!(target.seen_files.contains("https://example.com/b.pdf"));
    }

    #[tokio::test]
    async fn test_update_after_poll_missing_target() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path());

        let updated = store
            .update_after_poll(&subject(), "https://gone.example", "h", &BTreeSet::new())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_job_table_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path());

        let record = JobRecord {
            subject: subject(),
            url: "https://example.com".to_string(),
            interval_minutes: 30,
            quiet_hours: true,
            next_fire_at: Utc::now(),
        };
        store.put_job("chat-1_abc", record.clone()).await.unwrap();

        let jobs = store.load_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, "chat-1_abc");
        assert_eq!(jobs[0].1, record);

        store.remove_job("chat-1_abc").await.unwrap();
        assert!(store.load_jobs().await.unwrap().is_empty());
    }
}
