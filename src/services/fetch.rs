// src/services/fetch.rs

//! Page and file fetching over HTTP.
//!
//! Both fetchers are behind traits so the poll cycle can be exercised
//! without network access. The file fetcher enforces the configured size
//! cap twice: against the advertised Content-Length before reading, and
//! against the running byte count while streaming to disk.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ExtractedFile, FetchedFile, FileKind};
use crate::utils::{sanitize_filename, url_extension};

/// Retrieves the raw body of a page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the full body bytes for a URL.
    ///
    /// Any network error, timeout, or non-success status is a fetch error;
    /// a partial body is never returned.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Downloads a single file subject to a size cap.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Download the file to local disk and return a handle to it.
    async fn fetch(&self, file: &ExtractedFile) -> Result<FetchedFile>;
}

/// HTTP page fetcher backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(url, format!("status {status}")));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// HTTP file downloader with size cap enforcement.
#[derive(Clone)]
pub struct HttpFileFetcher {
    client: Client,
    max_bytes: u64,
    download_dir: PathBuf,
}

impl HttpFileFetcher {
    pub fn new(client: Client, max_bytes: u64, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            max_bytes,
            download_dir: download_dir.into(),
        }
    }

    /// Local filename for a download: sanitized display name plus an
    /// extension taken from the URL, or inferred from the Content-Type
    /// when the URL carries none.
    fn local_filename(&self, file: &ExtractedFile, content_type: &str) -> String {
        let ext = url_extension(&file.url).unwrap_or_else(|| {
            FileKind::from_content_type(content_type)
                .map(|kind| kind.default_extension())
                .unwrap_or(".bin")
                .to_string()
        });

        let mut name = sanitize_filename(&file.name);
        if name.is_empty() {
            name = "download".to_string();
        }
        if !name.to_lowercase().ends_with(&ext) {
            name.push_str(&ext);
        }
        name
    }
}

#[async_trait]
impl FileFetcher for HttpFileFetcher {
    async fn fetch(&self, file: &ExtractedFile) -> Result<FetchedFile> {
        let mut response = self.client.get(&file.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(&file.url, format!("status {status}")));
        }

        // Reject oversize files before reading when the server says so
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(AppError::size_limit(&file.url, self.max_bytes));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self
            .download_dir
            .join(self.local_filename(file, &content_type));

        let mut out = tokio::fs::File::create(&path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                drop(out);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(AppError::size_limit(&file.url, self.max_bytes));
            }
            out.write_all(&chunk).await?;
        }
        out.flush().await?;

        Ok(FetchedFile {
            path,
            name: file.name.clone(),
            kind: file.kind,
        })
    }
}
