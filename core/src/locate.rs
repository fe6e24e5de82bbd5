//! Finding the n-th occurrence of a context-qualified match.

use std::collections::HashMap;

use regex::Regex;

/// Byte offset of the `occurrence`-th (1-based) appearance of `matched` in
/// `text`, optionally preceded by `context` and any number of spaces.
///
/// The offset points at `matched` itself, past the context. `None` means the
/// requested occurrence does not exist.
pub fn locate(text: &str, matched: &str, context: &str, occurrence: usize) -> Option<usize> {
    let pattern = occurrence_pattern(matched, context)?;
    nth_match(&pattern, text, occurrence)
}

/// Caches compiled patterns across one reconciliation pass.
#[derive(Debug, Default)]
pub struct OccurrenceLocator {
    patterns: HashMap<(String, String), Option<Regex>>,
}

impl OccurrenceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locate(
        &mut self,
        text: &str,
        matched: &str,
        context: &str,
        occurrence: usize,
    ) -> Option<usize> {
        let pattern = self
            .patterns
            .entry((context.trim().to_string(), matched.to_string()))
            .or_insert_with(|| occurrence_pattern(matched, context))
            .as_ref()?;
        nth_match(pattern, text, occurrence)
    }
}

/// `context[ ]*(matched)`; a line break between the two never matches.
fn occurrence_pattern(matched: &str, context: &str) -> Option<Regex> {
    if matched.is_empty() {
        return None;
    }
    let context = context.trim();
    let pattern = if context.is_empty() {
        format!("({})", regex::escape(matched))
    } else {
        format!("{}[ ]*({})", regex::escape(context), regex::escape(matched))
    };
    Regex::new(&pattern).ok()
}

fn nth_match(pattern: &Regex, text: &str, occurrence: usize) -> Option<usize> {
    if occurrence == 0 {
        return None;
    }
    let mut remaining = occurrence;
    let mut cursor = 0;
    while cursor <= text.len() {
        let caps = pattern.captures_at(text, cursor)?;
        let whole = caps.get(0)?;
        remaining -= 1;
        if remaining == 0 {
            return caps.get(1).map(|m| m.start());
        }
        // resume one char after the start of this match so overlapping runs are seen
        let step = text[whole.start()..]
            .chars()
            .next()
            .map_or(1, char::len_utf8);
        cursor = whole.start() + step;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_each_plain_occurrence_in_order() {
        let text = "teh cat and teh dog and teh end";
        assert_eq!(locate(text, "teh", "", 1), Some(0));
        assert_eq!(locate(text, "teh", "", 2), Some(12));
        assert_eq!(locate(text, "teh", "", 3), Some(24));
        assert_eq!(locate(text, "teh", "", 4), None);
    }

    #[test]
    fn occurrence_zero_is_not_found() {
        assert_eq!(locate("teh", "teh", "", 0), None);
        assert_eq!(locate("teh", "", "", 1), None);
    }

    #[test]
    fn offset_skips_context_and_spacing() {
        let text = "The   the cat";
        assert_eq!(locate(text, "the", "The", 1), Some(6));
    }

    #[test]
    fn context_must_be_on_the_same_line() {
        let text = "The\nthe cat";
        assert_eq!(locate(text, "the", "The", 1), None);
        assert_eq!(locate(text, "the", "", 1), Some(4));
    }

    #[test]
    fn overlapping_repeats_are_distinct_occurrences() {
        let text = "the the the";
        assert_eq!(locate(text, "the", "the", 1), Some(4));
        assert_eq!(locate(text, "the", "the", 2), Some(8));
        assert_eq!(locate(text, "the", "the", 3), None);
    }

    #[test]
    fn matching_is_case_sensitive_and_literal() {
        let text = "a.b axb A.B";
        assert_eq!(locate(text, "a.b", "", 1), Some(0));
        assert_eq!(locate(text, "a.b", "", 2), None);
        assert_eq!(locate(text, "A.B", "", 1), Some(8));
    }

    #[test]
    fn handles_multibyte_text_before_the_match() {
        let text = "naïve naïve naïf";
        assert_eq!(locate(text, "naïve", "", 2), Some(7));
        assert_eq!(locate(text, "naïf", "naïve", 1), Some(14));
    }

    #[test]
    fn many_repeats_do_not_recurse() {
        let text = "ab ".repeat(20_000);
        assert_eq!(locate(&text, "ab", "", 20_000), Some(3 * 19_999));
        assert_eq!(locate(&text, "ab", "", 20_001), None);
    }

    #[test]
    fn cached_locator_matches_free_function() {
        let mut locator = OccurrenceLocator::new();
        let text = "The the cat sat. The the dog ran.";
        assert_eq!(locator.locate(text, "the", "The", 1), locate(text, "the", "The", 1));
        assert_eq!(locator.locate(text, "the", "The", 2), Some(21));
    }
}
