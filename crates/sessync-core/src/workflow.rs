//! Workflow checks applied to a summary before it is synced.

use serde::Serialize;

use crate::config::WorkflowConfig;
use crate::types::ReferenceSet;

const MIN_SUMMARY_CHARS: usize = 20;

const ACTION_WORDS: &[&str] = &[
    "implemented",
    "added",
    "created",
    "built",
    "developed",
    "fixed",
    "resolved",
    "corrected",
    "repaired",
    "updated",
    "modified",
    "changed",
    "improved",
    "refactored",
    "optimized",
    "enhanced",
    "tested",
    "validated",
    "verified",
    "documented",
    "wrote",
    "drafted",
];

/// Findings from checking a summary against workflow rules.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a summary and its extracted references against the workflow rules.
pub fn validate_summary(text: &str, refs: &ReferenceSet, workflow: &WorkflowConfig) -> Validation {
    let mut validation = Validation::default();

    if workflow.require_work_item_references && refs.work_items.is_empty() {
        validation.errors.push(
            "Work item references are required but none were found. \
             Include references like PROJ-123, #456, or issue-789."
                .to_string(),
        );
    }

    if text.trim().chars().count() < MIN_SUMMARY_CHARS {
        validation.warnings.push(
            "Session summary is very short. Consider adding more detail about what was accomplished."
                .to_string(),
        );
    }

    let lower = text.to_lowercase();
    if !ACTION_WORDS.iter().any(|w| lower.contains(w)) {
        validation.suggestions.push(
            "Include action words like 'implemented', 'fixed', 'added', or 'updated' to clarify what was done."
                .to_string(),
        );
    }

    if refs.files.is_empty() {
        validation.suggestions.push(
            "Mention the files that were modified to help track changes.".to_string(),
        );
    }

    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract, ExtractionPatterns};

    fn check(text: &str, require_refs: bool) -> Validation {
        let workflow = WorkflowConfig {
            mandatory_session_updates: true,
            require_work_item_references: require_refs,
        };
        let refs = extract(text, &ExtractionPatterns::defaults());
        validate_summary(text, &refs, &workflow)
    }

    #[test]
    fn missing_work_items_is_an_error_when_required() {
        let v = check("Refactored the session loader in src/loader.rs", true);
        assert!(!v.is_valid());
        assert_eq!(v.errors.len(), 1);
    }

    #[test]
    fn missing_work_items_is_fine_when_optional() {
        let v = check("Refactored the session loader in src/loader.rs", false);
        assert!(v.is_valid());
        assert!(v.suggestions.is_empty());
    }

    #[test]
    fn short_summary_warns() {
        let v = check("Fixed ABC-1", true);
        assert!(v.is_valid());
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn vague_summary_gets_suggestions() {
        let v = check("Spent the afternoon on ABC-9 with the team", true);
        assert_eq!(v.suggestions.len(), 2);
    }
}
