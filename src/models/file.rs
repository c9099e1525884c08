//! Extracted and downloaded file types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Document file extensions recognized by the extractor.
pub const DOCUMENT_EXTS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".txt",
];

/// Image file extensions.
pub const IMAGE_EXTS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

/// Audio file extensions.
pub const AUDIO_EXTS: &[&str] = &[".mp3", ".wav", ".ogg"];

/// Video file extensions.
pub const VIDEO_EXTS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv"];

/// Media category of an extracted link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Document,
    Image,
    Audio,
    Video,
}

impl FileKind {
    /// Classify a URL by its lowercase path extension.
    ///
    /// Returns `None` for extensions outside the allow-list.
    pub fn classify(url_path: &str) -> Option<Self> {
        let lower = url_path.to_lowercase();
        let matches = |exts: &[&str]| exts.iter().any(|ext| lower.ends_with(ext));

        if matches(IMAGE_EXTS) {
            Some(Self::Image)
        } else if matches(AUDIO_EXTS) {
            Some(Self::Audio)
        } else if matches(VIDEO_EXTS) {
            Some(Self::Video)
        } else if matches(DOCUMENT_EXTS) {
            Some(Self::Document)
        } else {
            None
        }
    }

    /// Fallback extension when a URL carries none, inferred from the
    /// Content-Type of the response.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        if content_type.contains("image") {
            Some(Self::Image)
        } else if content_type.contains("audio") {
            Some(Self::Audio)
        } else if content_type.contains("video") {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Default extension for the kind.
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Image => ".jpg",
            Self::Audio => ".mp3",
            Self::Video => ".mp4",
            Self::Document => ".bin",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Document => "document",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        };
        f.write_str(s)
    }
}

/// A downloadable link extracted from a page.
///
/// Transient value: lives for one poll cycle, only its URL is folded into
/// the target's seen set after a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFile {
    /// Display name from an alt/title attribute or the URL's last segment
    pub name: String,

    /// Absolute URL of the file
    pub url: String,

    /// Media category
    pub kind: FileKind,
}

impl ExtractedFile {
    /// Caption used when the file is delivered.
    pub fn caption(&self) -> String {
        format!("{} ({})", self.name, self.kind)
    }
}

/// Handle to a file downloaded to local disk, pending delivery.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    /// Local path of the downloaded file
    pub path: PathBuf,

    /// Display name carried over from extraction
    pub name: String,

    /// Media category
    pub kind: FileKind,
}
