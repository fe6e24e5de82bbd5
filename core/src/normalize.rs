//! Length-preserving text normalization.
//!
//! Regions matched by the configured ignore patterns are blanked to spaces and
//! a fixed set of punctuation characters is replaced one for one. The result
//! always has the same number of chars as the input and keeps every line break
//! where it was, so offsets found in the normalized text map straight back to
//! line/column positions in the original.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::Error;

/// Characters blanked before the text is sent to the checker.
pub const PUNCTUATION: &[char] = &[
    '`', '"', '!', '#', '$', '%', '&', '(', ')', '*', '+', ',', '.', '/', ':', ';', '<', '=',
    '>', '?', '@', '[', ']', '\\', '^', '_', '{', '|', '}',
];

static PATTERN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^/(.*)/([A-Za-z]*)$").expect("static regex"));

/// A user supplied `/pattern/flags` ignore rule.
#[derive(Debug, Clone)]
pub struct IgnorePattern {
    source: String,
    regex: Regex,
}

impl IgnorePattern {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let invalid = |reason: String| Error::Config {
            pattern: raw.to_string(),
            reason,
        };

        let caps = PATTERN_RE
            .captures(raw.trim())
            .ok_or_else(|| invalid("expected `/pattern/flags`".into()))?;
        let body = caps.get(1).map_or("", |m| m.as_str());
        let flags = caps.get(2).map_or("", |m| m.as_str());
        if body.is_empty() {
            return Err(invalid("empty pattern".into()));
        }
        // settings files often carry JSON-style doubled escapes
        let body = body.replace(r"\\", r"\");

        let mut inline = String::new();
        for flag in flags.chars() {
            match flag {
                'i' | 'm' | 's' => {
                    if !inline.contains(flag) {
                        inline.push(flag);
                    }
                }
                // global, unicode and sticky have no counterpart; every match is blanked
                'g' | 'u' | 'y' => {}
                other => return Err(invalid(format!("unsupported flag `{other}`"))),
            }
        }

        let pattern = if inline.is_empty() {
            body.to_string()
        } else {
            format!("(?{inline}){body}")
        };
        let regex = Regex::new(&pattern).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            source: raw.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Byte ranges of every non-empty match, in ascending order.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        self.regex
            .find_iter(text)
            .filter(|m| !m.is_empty())
            .map(|m| m.range())
            .collect()
    }
}

/// Compiled ignore patterns. Malformed patterns are skipped and kept as errors.
#[derive(Debug, Default)]
pub struct Normalizer {
    patterns: Vec<IgnorePattern>,
    errors: Vec<Error>,
}

impl Normalizer {
    pub fn new<S: AsRef<str>>(sources: &[S]) -> Self {
        let mut patterns = Vec::new();
        let mut errors = Vec::new();
        for source in sources {
            match IgnorePattern::parse(source.as_ref()) {
                Ok(pattern) => patterns.push(pattern),
                Err(err) => {
                    tracing::warn!(%err, "skipping ignore pattern");
                    errors.push(err);
                }
            }
        }
        Self { patterns, errors }
    }

    pub fn patterns(&self) -> &[IgnorePattern] {
        &self.patterns
    }

    /// Patterns that failed to compile.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn normalize(&self, text: &str) -> String {
        let mut current = text.to_string();
        for pattern in &self.patterns {
            let spans = pattern.spans(&current);
            if spans.is_empty() {
                continue;
            }
            tracing::trace!(pattern = pattern.source(), matches = spans.len(), "blanking");
            current = blank_spans(&current, &spans);
        }
        blank_punctuation(&current)
    }
}

/// Replace every char inside `spans` with a space, keeping `\n` and `\r`.
/// `spans` must be ascending, non-overlapping and on char boundaries.
pub fn blank_spans(text: &str, spans: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        if span.start < cursor || span.end > text.len() {
            continue;
        }
        out.push_str(&text[cursor..span.start]);
        out.extend(text[span.clone()].chars().map(|ch| match ch {
            '\n' | '\r' => ch,
            _ => ' ',
        }));
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

pub fn blank_punctuation(text: &str) -> String {
    text.chars()
        .map(|ch| if PUNCTUATION.contains(&ch) { ' ' } else { ch })
        .collect()
}
