// src/services/notify.rs

//! Delivery of files and messages to subjects.
//!
//! The chat transport that receives commands and forwards files is an
//! external collaborator; the engine only sees this trait. `DirNotifier`
//! is the local backend for development and testing.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{FetchedFile, Subject};

/// Delivers files and text messages to a subject.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a downloaded file with a caption.
    ///
    /// An `Ok` return is confirmation of delivery; the engine marks the
    /// file's URL seen only after it.
    async fn deliver(&self, subject: &Subject, file: &FetchedFile, caption: &str) -> Result<()>;

    /// Send a plain text message.
    async fn notify_text(&self, subject: &Subject, text: &str) -> Result<()>;
}

/// Filesystem-backed notifier: delivers into `{outbox}/{subject}/` and
/// appends messages to `{outbox}/{subject}/messages.log`.
#[derive(Clone)]
pub struct DirNotifier {
    outbox: PathBuf,
}

impl DirNotifier {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
        }
    }

    async fn subject_dir(&self, subject: &Subject) -> Result<PathBuf> {
        let dir = self.outbox.join(subject.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

#[async_trait]
impl Notifier for DirNotifier {
    async fn deliver(&self, subject: &Subject, file: &FetchedFile, caption: &str) -> Result<()> {
        let dir = self.subject_dir(subject).await?;
        let file_name = file
            .path
            .file_name()
            .ok_or_else(|| AppError::delivery(subject.as_str(), "download has no file name"))?;

        tokio::fs::copy(&file.path, dir.join(file_name)).await?;
        self.notify_text(subject, &format!("delivered: {caption}"))
            .await
    }

    async fn notify_text(&self, subject: &Subject, text: &str) -> Result<()> {
        let dir = self.subject_dir(subject).await?;
        let mut log_file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("messages.log"))
            .await?;
        log_file.write_all(text.as_bytes()).await?;
        log_file.write_all(b"\n").await?;
        log_file.flush().await?;
        Ok(())
    }
}
