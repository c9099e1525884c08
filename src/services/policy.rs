// src/services/policy.rs

//! Authorization policy for the command surface.
//!
//! Evaluated by the command layer before a track/untrack request reaches
//! the engine; the engine itself trusts its caller.

use std::collections::HashSet;

use crate::models::Subject;

/// Decides whether a subject may issue tracking commands.
pub trait AccessPolicy: Send + Sync {
    fn is_authorized(&self, subject: &Subject) -> bool;
}

/// Allow-list policy backed by the configured subject list.
///
/// An empty list authorizes every subject (development mode).
pub struct SubjectAllowList {
    allowed: HashSet<String>,
}

impl SubjectAllowList {
    pub fn new(subjects: &[String]) -> Self {
        Self {
            allowed: subjects.iter().cloned().collect(),
        }
    }
}

impl AccessPolicy for SubjectAllowList {
    fn is_authorized(&self, subject: &Subject) -> bool {
        self.allowed.is_empty() || self.allowed.contains(subject.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_allows_all() {
        let policy = SubjectAllowList::new(&[]);
        assert!(policy.is_authorized(&Subject::from("anyone")));
    }

    #[test]
    fn test_allow_list_enforced() {
        let policy = SubjectAllowList::new(&["chat-1".to_string()]);
        assert!(policy.is_authorized(&Subject::from("chat-1")));
        assert!(!policy.is_authorized(&Subject::from("chat-2")));
    }
}
