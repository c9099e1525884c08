//! Tracked target data structures.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for the owner of tracked URLs (a chat or user identity).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(pub String);

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-URL monitoring state for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedTarget {
    /// Hex digest of the last-seen page body (empty string = never polled)
    #[serde(default)]
    pub fingerprint: String,

    /// Polling interval in minutes
    pub interval_minutes: u64,

    /// Suppress polls outside the allowed daily window
    #[serde(default)]
    pub quiet_hours: bool,

    /// URLs of files already extracted and delivered.
    /// Grows monotonically until the target is removed.
    #[serde(default)]
    pub seen_files: BTreeSet<String>,
}

impl TrackedTarget {
    /// Create a fresh target that has never been polled.
    pub fn new(interval_minutes: u64, quiet_hours: bool) -> Self {
        Self {
            fingerprint: String::new(),
            interval_minutes,
            quiet_hours,
            seen_files: BTreeSet::new(),
        }
    }

    /// Whether the target has been polled at least once.
    pub fn polled(&self) -> bool {
        !self.fingerprint.is_empty()
    }

    /// Format the target for display using a template.
    ///
    /// Supported placeholders: `{url}`, `{interval}`, `{quiet}`
    pub fn format(&self, url: &str, template: &str) -> String {
        template
            .replace("{url}", url)
            .replace("{interval}", &self.interval_minutes.to_string())
            .replace("{quiet}", if self.quiet_hours { "ON" } else { "OFF" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_target_never_polled() {
        let target = TrackedTarget::new(30, false);
        assert!(!target.polled());
        assert!(target.seen_files.is_empty());
    }

    #[test]
    fn test_format() {
        let target = TrackedTarget::new(15, true);
        let result = target.format("https://example.com", "{url} every {interval}m ({quiet})");
        assert_eq!(result, "https://example.com every 15m (ON)");
    }

    #[test]
    fn test_serde_roundtrip_defaults() {
        let json = r#"{"interval_minutes": 10}"#;
        let target: TrackedTarget = serde_json::from_str(json).unwrap();
        assert_eq!(target.interval_minutes, 10);
        assert!(!target.quiet_hours);
        assert!(target.fingerprint.is_empty());
    }
}
