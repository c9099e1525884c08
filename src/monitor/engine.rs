// src/monitor/engine.rs

//! One poll cycle: fetch the page, fingerprint it, compare against the
//! stored state, extract links, diff against the seen set, download and
//! deliver the new files, then persist the updated state.
//!
//! Cycles for different targets run fully in parallel. Cycles for the same
//! target are single-flight: an overlapping invocation is coalesced, not
//! queued. Within a cycle the steps are strictly sequential.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{ExtractedFile, Subject};
use crate::monitor::detect;
use crate::monitor::scheduler::{PollHandler, job_key};
use crate::services::{FileFetcher, LinkExtractor, Notifier, PageFetcher};
use crate::storage::TrackingStore;

/// Result of one poll invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another invocation for the same target was in flight
    Coalesced,
    /// Transient fetch failure; state untouched, retried next interval
    FetchFailed,
    /// The target was untracked while the cycle ran
    TargetGone,
    /// Fingerprint matched; the cycle was a no-op
    Unchanged,
    /// Page changed; counts of files delivered and skipped
    Updated { delivered: usize, skipped: usize },
}

/// Orchestrates poll cycles over the injected capabilities.
pub struct MonitorEngine {
    store: Arc<dyn TrackingStore>,
    pages: Arc<dyn PageFetcher>,
    files: Arc<dyn FileFetcher>,
    notifier: Arc<dyn Notifier>,
    extractor: LinkExtractor,
    in_flight: StdMutex<HashSet<String>>,
}

/// Removes the key from the in-flight set when the cycle ends.
struct FlightGuard<'a> {
    engine: &'a MonitorEngine,
    key: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.engine
            .in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&self.key);
    }
}

impl MonitorEngine {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        pages: Arc<dyn PageFetcher>,
        files: Arc<dyn FileFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            pages,
            files,
            notifier,
            extractor: LinkExtractor::new(),
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    /// Run one poll cycle for a tracked (subject, URL) pair.
    pub async fn poll_once(&self, subject: &Subject, url: &str) -> Result<PollOutcome> {
        let Some(_guard) = self.begin(subject, url) else {
            log::debug!("poll for {url} already in flight, coalescing");
            return Ok(PollOutcome::Coalesced);
        };

        // 1. Fetch; failures are transient and mutate nothing
        let body = match self.pages.fetch(url).await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("fetch failed for {url}: {e}");
                return Ok(PollOutcome::FetchFailed);
            }
        };

        // 2. Fingerprint and compare against the stored state
        let digest = detect::fingerprint(&body);
        let Some(target) = self.store.get(subject, url).await? else {
            // Untracked between the fire and now
            return Ok(PollOutcome::TargetGone);
        };
        if !detect::has_changed(&target.fingerprint, &digest) {
            return Ok(PollOutcome::Unchanged);
        }

        // 3. Extract links and keep the ones not seen before
        let html = String::from_utf8_lossy(&body);
        let extracted = self.extractor.extract(&html, url);
        let new_files: Vec<&ExtractedFile> = extracted
            .iter()
            .filter(|file| !target.seen_files.contains(&file.url))
            .collect();

        // 4. Download and deliver; only confirmed deliveries become seen
        let mut delivered_urls = BTreeSet::new();
        let mut captions = Vec::new();
        let mut skipped = 0;

        for file in new_files {
            if delivered_urls.contains(&file.url) {
                continue;
            }
            match self.forward(subject, file).await {
                Ok(()) => {
                    delivered_urls.insert(file.url.clone());
                    captions.push(file.caption());
                }
                Err(e) if e.is_transient() => {
                    log::warn!("skipping {}: {e}", file.url);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        // 5. Persist fingerprint and seen set in one durable update
        let persisted = self
            .store
            .update_after_poll(subject, url, &digest, &delivered_urls)
            .await?;
        if !persisted {
            return Ok(PollOutcome::TargetGone);
        }

        // 6. One aggregate summary; a hash-only change stays silent
        if !captions.is_empty() {
            let text = format!("Website updated: {url}\nNew files:\n{}", captions.join("\n"));
            if let Err(e) = self.notifier.notify_text(subject, &text).await {
                log::warn!("summary message failed for {subject}: {e}");
            }
        }

        Ok(PollOutcome::Updated {
            delivered: delivered_urls.len(),
            skipped,
        })
    }

    /// One-shot extraction without tracking.
    pub async fn extract_once(&self, url: &str) -> Result<Vec<ExtractedFile>> {
        let body = self.pages.fetch(url).await?;
        let html = String::from_utf8_lossy(&body);
        Ok(self.extractor.extract(&html, url))
    }

    /// Download one file and deliver it, removing the local copy afterwards.
    async fn forward(&self, subject: &Subject, file: &ExtractedFile) -> Result<()> {
        let fetched = self.files.fetch(file).await?;
        let delivery = self.notifier.deliver(subject, &fetched, &file.caption()).await;
        let _ = tokio::fs::remove_file(&fetched.path).await;
        delivery.map_err(|e| AppError::delivery(subject.as_str(), e))
    }

    /// Claim the single-flight slot for a target, or None if taken.
    fn begin(&self, subject: &Subject, url: &str) -> Option<FlightGuard<'_>> {
        let key = job_key(subject, url);
        let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(FlightGuard { engine: self, key })
    }
}

#[async_trait]
impl PollHandler for MonitorEngine {
    async fn poll(&self, subject: &Subject, url: &str) {
        match self.poll_once(subject, url).await {
            Ok(PollOutcome::Updated { delivered, skipped }) => {
                log::info!("{url}: {delivered} file(s) delivered, {skipped} skipped");
            }
            Ok(_) => {}
            Err(e) => log::error!("poll cycle failed for {url}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchedFile, FileKind, TrackedTarget};
    use crate::storage::JsonStore;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const URL: &str = "https://example.com/news";
    const D1: &str = "https://example.com/files/d1.pdf";
    const D2: &str = "https://example.com/files/d2.pdf";

    fn page_with_links(links: &[&str]) -> Vec<u8> {
        let anchors: String = links
            .iter()
            .map(|href| format!(r#"<a href="{href}">file</a>"#))
            .collect();
        format!("<html><body>{anchors}</body></html>").into_bytes()
    }

    /// Page fetcher returning a configurable body, optionally slowly.
    struct StubPages {
        body: Mutex<Option<Vec<u8>>>,
        delay: Duration,
    }

    impl StubPages {
        fn with_body(body: Vec<u8>) -> Self {
            Self {
                body: Mutex::new(Some(body)),
                delay: Duration::ZERO,
            }
        }

        fn failing() -> Self {
            Self {
                body: Mutex::new(None),
                delay: Duration::ZERO,
            }
        }

        fn set_body(&self, body: Vec<u8>) {
            *self.body.lock().unwrap() = Some(body);
        }
    }

    #[async_trait]
    impl PageFetcher for StubPages {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.body
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::fetch(url, "connection refused"))
        }
    }

    /// File fetcher that succeeds unless the URL is marked oversize.
    #[derive(Default)]
    struct StubFiles {
        oversize: HashSet<String>,
        fetches: AtomicUsize,
    }

    impl StubFiles {
        fn oversize(url: &str) -> Self {
            Self {
                oversize: HashSet::from([url.to_string()]),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FileFetcher for StubFiles {
        async fn fetch(&self, file: &ExtractedFile) -> Result<FetchedFile> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.oversize.contains(&file.url) {
                return Err(AppError::size_limit(&file.url, 1));
            }
            Ok(FetchedFile {
                path: PathBuf::from("/nonexistent/download"),
                name: file.name.clone(),
                kind: file.kind,
            })
        }
    }

    /// Notifier recording deliveries, optionally failing them.
    #[derive(Default)]
    struct RecordingNotifier {
        deliveries: Mutex<Vec<String>>,
        texts: Mutex<Vec<String>>,
        fail_deliveries: std::sync::atomic::AtomicBool,
    }

    impl RecordingNotifier {
        fn delivered(&self) -> Vec<String> {
            self.deliveries.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.texts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(
            &self,
            subject: &Subject,
            _file: &FetchedFile,
            caption: &str,
        ) -> Result<()> {
            if self.fail_deliveries.load(Ordering::SeqCst) {
                return Err(AppError::delivery(subject.as_str(), "transport down"));
            }
            self.deliveries.lock().unwrap().push(caption.to_string());
            Ok(())
        }

        async fn notify_text(&self, _subject: &Subject, text: &str) -> Result<()> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Fixture {
        _tmp: TempDir,
        store: Arc<JsonStore>,
        pages: Arc<StubPages>,
        files: Arc<StubFiles>,
        notifier: Arc<RecordingNotifier>,
        engine: Arc<MonitorEngine>,
        subject: Subject,
    }

    async fn fixture(pages: StubPages, files: StubFiles) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::new(tmp.path()));
        let pages = Arc::new(pages);
        let files = Arc::new(files);
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = Arc::new(MonitorEngine::new(
            Arc::clone(&store) as Arc<dyn TrackingStore>,
            Arc::clone(&pages) as Arc<dyn PageFetcher>,
            Arc::clone(&files) as Arc<dyn FileFetcher>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        ));
        let subject = Subject::from("chat-1");
        store
            .upsert(&subject, URL, TrackedTarget::new(30, false))
            .await
            .unwrap();
        Fixture {
            _tmp: tmp,
            store,
            pages,
            files,
            notifier,
            engine,
            subject,
        }
    }

    #[tokio::test]
    async fn test_first_cycle_delivers_and_persists() {
        let f = fixture(
            StubPages::with_body(page_with_links(&[D1])),
            StubFiles::default(),
        )
        .await;

        let outcome = f.engine.poll_once(&f.subject, URL).await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Updated {
                delivered: 1,
                skipped: 0
            }
        );

        let target = f.store.get(&f.subject, URL).await.unwrap().unwrap();
        assert_eq!(target.fingerprint, detect::fingerprint(&page_with_links(&[D1])));
        assert!(target.seen_files.contains(D1));
        assert_eq!(target.seen_files.len(), 1);

        assert_eq!(f.notifier.delivered().len(), 1);
        let texts = f.notifier.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with(&format!("Website updated: {URL}")));
        assert!(texts[0].contains("d1.pdf"));
    }

    #[tokio::test]
    async fn test_unchanged_page_is_noop() {
        let f = fixture(
            StubPages::with_body(page_with_links(&[D1])),
            StubFiles::default(),
        )
        .await;

        f.engine.poll_once(&f.subject, URL).await.unwrap();
        let before = f.store.get(&f.subject, URL).await.unwrap().unwrap();

        let outcome = f.engine.poll_once(&f.subject, URL).await.unwrap();
        assert_eq!(outcome, PollOutcome::Unchanged);

        let after = f.store.get(&f.subject, URL).await.unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(f.notifier.delivered().len(), 1);
        assert_eq!(f.notifier.texts().len(), 1);
        // No extraction or download happened on the unchanged cycle
        assert_eq!(f.files.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_page_delivers_only_new_files() {
        let f = fixture(
            StubPages::with_body(page_with_links(&[D1])),
            StubFiles::default(),
        )
        .await;

        f.engine.poll_once(&f.subject, URL).await.unwrap();
        f.pages.set_body(page_with_links(&[D1, D2]));

        let outcome = f.engine.poll_once(&f.subject, URL).await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Updated {
                delivered: 1,
                skipped: 0
            }
        );

        let target = f.store.get(&f.subject, URL).await.unwrap().unwrap();
        assert_eq!(target.fingerprint, detect::fingerprint(&page_with_links(&[D1, D2])));
        assert!(target.seen_files.contains(D1));
        assert!(target.seen_files.contains(D2));

        let texts = f.notifier.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[1].contains("d2.pdf"));
        assert!(!texts[1].contains("d1.pdf"));
    }

    #[tokio::test]
    async fn test_oversize_file_skipped_but_fingerprint_advances() {
        let f = fixture(
            StubPages::with_body(page_with_links(&[D1])),
            StubFiles::oversize(D1),
        )
        .await;

        let outcome = f.engine.poll_once(&f.subject, URL).await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Updated {
                delivered: 0,
                skipped: 1
            }
        );

        let target = f.store.get(&f.subject, URL).await.unwrap().unwrap();
        assert!(!target.fingerprint.is_empty());
        assert!(target.seen_files.is_empty());
        // No files delivered means no summary either
        assert!(f.notifier.texts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_stays_unseen_and_retries() {
        let f = fixture(
            StubPages::with_body(page_with_links(&[D1])),
            StubFiles::default(),
        )
        .await;

        f.notifier.fail_deliveries.store(true, Ordering::SeqCst);
        let outcome = f.engine.poll_once(&f.subject, URL).await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Updated {
                delivered: 0,
                skipped: 1
            }
        );
        let target = f.store.get(&f.subject, URL).await.unwrap().unwrap();
        assert!(target.seen_files.is_empty());

        // Transport recovers and the page changes again: the file is still new
        f.notifier.fail_deliveries.store(false, Ordering::SeqCst);
        f.pages
            .set_body(page_with_links(&[D1, "https://example.com/x.png"]));

        let outcome = f.engine.poll_once(&f.subject, URL).await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Updated {
                delivered: 2,
                skipped: 0
            }
        );
        let target = f.store.get(&f.subject, URL).await.unwrap().unwrap();
        assert!(target.seen_files.contains(D1));
    }

    #[tokio::test]
    async fn test_fetch_failure_mutates_nothing() {
        let f = fixture(StubPages::failing(), StubFiles::default()).await;

        let outcome = f.engine.poll_once(&f.subject, URL).await.unwrap();
        assert_eq!(outcome, PollOutcome::FetchFailed);

        let target = f.store.get(&f.subject, URL).await.unwrap().unwrap();
        assert!(target.fingerprint.is_empty());
        assert!(f.notifier.texts().is_empty());
    }

    #[tokio::test]
    async fn test_untracked_target_aborts_silently() {
        let f = fixture(
            StubPages::with_body(page_with_links(&[D1])),
            StubFiles::default(),
        )
        .await;

        f.store.remove(&f.subject, URL).await.unwrap();
        let outcome = f.engine.poll_once(&f.subject, URL).await.unwrap();
        assert_eq!(outcome, PollOutcome::TargetGone);
        assert!(f.notifier.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_polls_single_flight() {
        let mut pages = StubPages::with_body(page_with_links(&[D1]));
        pages.delay = Duration::from_millis(100);
        let f = fixture(pages, StubFiles::default()).await;

        let engine = Arc::clone(&f.engine);
        let subject = f.subject.clone();
        let first = tokio::spawn(async move { engine.poll_once(&subject, URL).await.unwrap() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = f.engine.poll_once(&f.subject, URL).await.unwrap();

        assert_eq!(second, PollOutcome::Coalesced);
        assert_eq!(
            first.await.unwrap(),
            PollOutcome::Updated {
                delivered: 1,
                skipped: 0
            }
        );

        let target = f.store.get(&f.subject, URL).await.unwrap().unwrap();
        assert_eq!(target.seen_files.len(), 1);
        assert_eq!(f.notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_extract_once_does_not_track() {
        let f = fixture(
            StubPages::with_body(page_with_links(&[D1, D2])),
            StubFiles::default(),
        )
        .await;

        let files = f.engine.extract_once(URL).await.unwrap();
        assert_eq!(files.len(), 2);

        // One-shot extraction leaves the tracked state untouched
        let target = f.store.get(&f.subject, URL).await.unwrap().unwrap();
        assert!(target.fingerprint.is_empty());
        assert!(f.notifier.delivered().is_empty());
    }
}
