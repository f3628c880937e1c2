//! Reference extraction from free-text session summaries.
//!
//! Extraction is pure: a compiled pattern list and a string in, a
//! [`ReferenceSet`] out. Patterns are compiled once when configuration is
//! loaded, so a malformed regex is rejected before any session runs and
//! extraction itself cannot fail.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessyncError};
use crate::types::{Category, ReferenceSet};

/// What a pattern's matches are recorded as.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternTag {
    WorkItem,
    File,
}

/// One configured extraction pattern.
///
/// When the regex has a capture group, group 1 is recorded instead of the
/// whole match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternSpec {
    pub tag: PatternTag,
    pub regex: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl PatternSpec {
    pub fn new(tag: PatternTag, regex: &str) -> Self {
        Self {
            tag,
            regex: regex.to_string(),
            case_insensitive: false,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}

const FILE_EXTENSIONS: &str = "rs|toml|lock|md|rst|txt|py|pyi|js|jsx|mjs|ts|tsx|json|ya?ml|go|java|kt|swift|c|h|cc|cpp|hpp|cs|rb|php|sh|sql|html|css|scss|xml|proto|ini|cfg|conf|env|ipynb";

/// The pattern list used when configuration does not provide one.
pub fn default_patterns() -> Vec<PatternSpec> {
    vec![
        // Tracker keys (PROJ-123)
        PatternSpec::new(PatternTag::WorkItem, r"\b[A-Z][A-Z0-9]+-\d+\b"),
        // Source host issues (#123)
        PatternSpec::new(PatternTag::WorkItem, r"#\d+\b"),
        PatternSpec::new(PatternTag::WorkItem, r"\bissue-\d+\b").case_insensitive(),
        PatternSpec::new(PatternTag::WorkItem, r"\btask-\d+\b").case_insensitive(),
        // File patterns start at a word boundary that is not part of a URL,
        // email or longer path: line start, whitespace, quote or bracket.
        // Relative paths with an extension
        PatternSpec::new(
            PatternTag::File,
            r#"(?:^|[\s`'"(\[])((?:[\w-][\w.-]*/)+[\w-][\w.-]*\.[A-Za-z][A-Za-z0-9]*)\b"#,
        ),
        // Bare file names with a known source or document extension
        PatternSpec::new(PatternTag::File, &format!(
            r#"(?:^|[\s`'"(\[])([\w-][\w.-]*\.(?:{FILE_EXTENSIONS}))\b"#
        )),
        PatternSpec::new(
            PatternTag::File,
            r#"(?:^|[\s`'"(\[])((?:src|docs)/[\w/.-]*\w)"#,
        ),
    ]
}

/// A validated, compiled pattern list in configuration order.
#[derive(Debug, Clone)]
pub struct ExtractionPatterns {
    compiled: Vec<(PatternTag, Regex)>,
}

impl ExtractionPatterns {
    /// Compile every pattern, rejecting the first malformed one.
    pub fn compile(specs: &[PatternSpec]) -> Result<Self> {
        let compiled = specs
            .iter()
            .map(|spec| {
                RegexBuilder::new(&spec.regex)
                    .case_insensitive(spec.case_insensitive)
                    .build()
                    .map(|re| (spec.tag, re))
                    .map_err(|e| SessyncError::ExtractionPatternInvalid {
                        pattern: spec.regex.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { compiled })
    }

    pub fn defaults() -> Self {
        // The built-in list is fixed and known to compile.
        Self::compile(&default_patterns()).unwrap_or(Self {
            compiled: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Apply every pattern to `text` in configuration order.
///
/// Work items keep first-seen order across all work-item patterns; files are
/// collected as a set. Zero matches is a valid, empty result.
pub fn extract(text: &str, patterns: &ExtractionPatterns) -> ReferenceSet {
    let mut refs = ReferenceSet::default();

    for (tag, re) in &patterns.compiled {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };
            let value = m.as_str();
            if value.is_empty() {
                continue;
            }
            match tag {
                PatternTag::WorkItem => refs.add_work_item(value),
                PatternTag::File => refs.add_file(value),
            }
        }
    }

    refs
}

/// A category detected in a summary, with the lines that triggered it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryMatch {
    pub category: Category,
    pub lines: Vec<String>,
}

fn keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Feature => &["implemented", "added", "created", "new feature", "enhancement"],
        Category::Bugfix => &["fixed", "resolved", "bug", "corrected"],
        Category::Architecture => &["architecture", "design", "refactor", "restructure", "migrate"],
        Category::Documentation => &["documentation", "docs", "readme", "guide", "manual"],
    }
}

/// Classify a summary by keyword. Case-insensitive and deterministic.
pub fn categorize(text: &str) -> Vec<CategoryMatch> {
    Category::ALL
        .iter()
        .filter_map(|&category| {
            let words = keywords(category);
            let lines: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|line| {
                    let lower = line.to_lowercase();
                    words.iter().any(|w| lower.contains(w))
                })
                .map(str::to_string)
                .collect();

            (!lines.is_empty()).then_some(CategoryMatch { category, lines })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_item_only(regex: &str) -> ExtractionPatterns {
        ExtractionPatterns::compile(&[PatternSpec::new(PatternTag::WorkItem, regex)]).unwrap()
    }

    #[test]
    fn collapses_duplicates_in_first_seen_order() {
        let patterns = work_item_only(r"[A-Z]+-\d+");
        let refs = extract("Fixed PROJ-12 and PROJ-5, see also PROJ-12", &patterns);
        assert_eq!(refs.work_items, vec!["PROJ-12", "PROJ-5"]);
        assert!(refs.files.is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let patterns = ExtractionPatterns::defaults();
        let text = "Closed #41 and ABC-7; touched src/sync/mod.rs and README.md";
        assert_eq!(extract(text, &patterns), extract(text, &patterns));
    }

    #[test]
    fn patterns_apply_in_configuration_order() {
        let patterns = ExtractionPatterns::compile(&[
            PatternSpec::new(PatternTag::WorkItem, r"#\d+"),
            PatternSpec::new(PatternTag::WorkItem, r"[A-Z]+-\d+"),
        ])
        .unwrap();
        let refs = extract("PROJ-1 then #7", &patterns);
        assert_eq!(refs.work_items, vec!["#7", "PROJ-1"]);
    }

    #[test]
    fn capture_group_is_recorded_when_present() {
        let patterns = work_item_only(r"(?:closes|fixes) #(\d+)");
        let refs = extract("This fixes #88 and mentions #90", &patterns);
        assert_eq!(refs.work_items, vec!["88"]);
    }

    #[test]
    fn defaults_pick_up_files_once() {
        let refs = extract(
            "Refactored src/lib.rs. Updated docs/setup and src/lib.rs again.",
            &ExtractionPatterns::defaults(),
        );
        assert!(refs.files.contains("src/lib.rs"));
        assert!(refs.files.contains("docs/setup"));
        assert_eq!(refs.files.iter().filter(|f| f.as_str() == "src/lib.rs").count(), 1);
    }

    #[test]
    fn prose_hosts_and_urls_are_not_files() {
        let refs = extract(
            "Per the docs, e.g. v1.2 at https://example.com/guide.html, mail bob@bar.com. \
             Touched `Cargo.toml`, (main.rs) and crates/core/lib.rs.",
            &ExtractionPatterns::defaults(),
        );
        let files: Vec<&str> = refs.files.iter().map(String::as_str).collect();
        assert_eq!(files, vec!["Cargo.toml", "crates/core/lib.rs", "main.rs"]);
    }

    #[test]
    fn case_insensitive_patterns() {
        let refs = extract("Finished Task-9 and ISSUE-3", &ExtractionPatterns::defaults());
        assert!(refs.work_items.contains(&"Task-9".to_string()));
        assert!(refs.work_items.contains(&"ISSUE-3".to_string()));
    }

    #[test]
    fn no_matches_is_empty() {
        let refs = extract("paired on naming today", &ExtractionPatterns::defaults());
        assert!(refs.is_empty());
    }

    #[test]
    fn malformed_pattern_rejected_at_compile() {
        let err = ExtractionPatterns::compile(&[PatternSpec::new(PatternTag::File, "src/(")])
            .unwrap_err();
        assert!(matches!(
            err,
            SessyncError::ExtractionPatternInvalid { ref pattern, .. } if pattern == "src/("
        ));
    }

    #[test]
    fn categorize_collects_trigger_lines() {
        let text = "Implemented the export endpoint\nFixed a crash on startup\nLunch";
        let matches = categorize(text);
        let categories: Vec<Category> = matches.iter().map(|m| m.category).collect();
        assert_eq!(categories, vec![Category::Feature, Category::Bugfix]);
        assert_eq!(matches[1].lines, vec!["Fixed a crash on startup"]);
    }
}
