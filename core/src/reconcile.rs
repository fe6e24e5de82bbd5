//! Turning the checker's unordered, unpositioned report into positioned problems.
//!
//! The checker only says *what* it found (the matched text and the word
//! before it), never *where*. Identical reports are told apart by counting:
//! the n-th report of a given context/match pair is pinned to the n-th place
//! that pair occurs in the normalized text.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::locate::OccurrenceLocator;

/// Suggestions as reported: a single value or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuggestionList {
    One(String),
    Many(Vec<String>),
}

impl SuggestionList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            SuggestionList::One(one) => vec![one],
            SuggestionList::Many(many) => many,
        }
    }
}

/// One issue as reported by the external checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMatch {
    pub matched_text: String,
    #[serde(default)]
    pub preceding_context: Option<String>,
    pub category: String,
    #[serde(default)]
    pub suggestions: Option<SuggestionList>,
}

impl RawMatch {
    pub fn new(matched_text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            matched_text: matched_text.into(),
            preceding_context: None,
            category: category.into(),
            suggestions: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.preceding_context = Some(context.into());
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = Some(SuggestionList::Many(
            suggestions.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Preceding context word, empty when the checker gave none.
    pub fn context(&self) -> &str {
        self.preceding_context.as_deref().map_or("", str::trim)
    }

    pub fn suggestion_vec(&self) -> Vec<String> {
        self.suggestions
            .clone()
            .map(SuggestionList::into_vec)
            .unwrap_or_default()
    }

    pub fn key(&self) -> OccurrenceKey {
        OccurrenceKey::new(&self.matched_text, self.context())
    }
}

/// Identifies reports that cannot be told apart without a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceKey(String);

impl OccurrenceKey {
    pub fn new(matched: &str, context: &str) -> Self {
        if context.is_empty() {
            Self(matched.to_string())
        } else {
            Self(format!("{context} {matched}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How many reports per key have been placed so far in this pass.
#[derive(Debug, Default)]
pub struct OccurrenceCounter {
    counts: HashMap<OccurrenceKey, usize>,
}

impl OccurrenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolved(&self, key: &OccurrenceKey) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// 1-based occurrence index the next report for `key` should resolve to.
    pub fn next_occurrence(&self, key: &OccurrenceKey) -> usize {
        self.resolved(key) + 1
    }

    pub fn record(&mut self, key: OccurrenceKey) {
        *self.counts.entry(key).or_default() += 1;
    }
}

/// A positioned problem. Lines are 0-based, columns count chars from the line start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub matched_text: String,
    pub preceding_context: String,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub category: String,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Place every raw match on the normalized text. Reports that are ignored,
/// malformed, or whose occurrence cannot be found are dropped.
pub fn reconcile(
    normalized: &str,
    raw_matches: &[RawMatch],
    ignore_list: &BTreeSet<String>,
) -> Vec<Problem> {
    let mut counter = OccurrenceCounter::new();
    let mut locator = OccurrenceLocator::new();
    let mut problems = Vec::with_capacity(raw_matches.len());

    for raw in raw_matches {
        if ignore_list.contains(&raw.matched_text) {
            continue;
        }
        if let Some(problem) = resolve_one(normalized, raw, &mut counter, &mut locator) {
            problems.push(problem);
        }
    }
    problems
}

fn resolve_one(
    normalized: &str,
    raw: &RawMatch,
    counter: &mut OccurrenceCounter,
    locator: &mut OccurrenceLocator,
) -> Option<Problem> {
    let matched = raw.matched_text.as_str();
    if matched.trim().is_empty() || matched.contains('\n') {
        tracing::debug!(?raw, "dropping malformed match");
        return None;
    }

    let context = raw.context();
    let key = raw.key();
    let occurrence = counter.next_occurrence(&key);
    let Some(offset) = locator.locate(normalized, matched, context, occurrence) else {
        tracing::debug!(key = key.as_str(), occurrence, "occurrence not found");
        return None;
    };
    counter.record(key);

    let (line, column) = line_column(normalized, offset);
    let suggestions = raw.suggestion_vec();
    Some(Problem {
        matched_text: matched.to_string(),
        preceding_context: context.to_string(),
        start_line: line,
        start_column: column,
        end_line: line,
        end_column: column + matched.chars().count(),
        category: raw.category.clone(),
        message: format_message(&raw.category, matched, &suggestions),
        suggestions,
    })
}

/// `<category> [<matched>] - suggest [<s1>, <s2>]`
pub fn format_message(category: &str, matched: &str, suggestions: &[String]) -> String {
    format!(
        "{category} [{matched}] - suggest [{}]",
        suggestions.join(", ")
    )
}

/// 0-based line and char column of a byte offset.
pub fn line_column(text: &str, byte_offset: usize) -> (usize, usize) {
    let mut offset = byte_offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &text[..offset];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
    (line, before[line_start..].chars().count())
}
