// src/services/extract.rs

//! Media and document link extraction.
//!
//! Scans a fetched page for anchor and media elements whose reference
//! resolves to an allow-listed file extension. Parsing is best-effort:
//! malformed HTML yields whatever links are recoverable, never an error.

use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ExtractedFile, FileKind};
use crate::utils::{last_path_segment, resolve_url};

/// Elements that can reference a downloadable file.
const ELEMENT_SELECTOR: &str = "a, img, audio, video, source";

/// Extracts candidate file links from HTML pages.
pub struct LinkExtractor {
    element_sel: Selector,
}

impl LinkExtractor {
    /// Create a new link extractor.
    pub fn new() -> Self {
        // The selector is a constant; parsing it cannot fail.
        Self {
            element_sel: Self::parse_selector(ELEMENT_SELECTOR)
                .expect("element selector must parse"),
        }
    }

    /// Extract file links from `html`, resolving references against `base_url`.
    ///
    /// Duplicate URLs are kept; deduplication happens downstream against the
    /// target's seen set.
    pub fn extract(&self, html: &str, base_url: &str) -> Vec<ExtractedFile> {
        let document = Html::parse_document(html);
        let base = Url::parse(base_url).ok();

        let mut files = Vec::new();
        for element in document.select(&self.element_sel) {
            let value = element.value();
            let Some(href) = value.attr("href").or_else(|| value.attr("src")) else {
                continue;
            };

            let Some(resolved) = Self::absolutize(base.as_ref(), href) else {
                continue;
            };

            let Some(kind) = FileKind::classify(resolved.path()) else {
                continue;
            };

            let url = resolved.to_string();
            let name = value
                .attr("alt")
                .or_else(|| value.attr("title"))
                .map(str::to_string)
                .or_else(|| last_path_segment(&url))
                .unwrap_or_else(|| url.clone());

            files.push(ExtractedFile { name, url, kind });
        }
        files
    }

    /// Resolve `href` to an absolute URL, using the base when available.
    fn absolutize(base: Option<&Url>, href: &str) -> Option<Url> {
        match base {
            Some(base) => resolve_url(base, href).and_then(|s| Url::parse(&s).ok()),
            // Without a parseable base only absolute references survive
            None => Url::parse(href).ok(),
        }
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::validation(format!("selector '{s}': {e:?}")))
    }
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::new()
    }
}
