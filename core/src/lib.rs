//! mdspell core engine.
//! Normalizes documents before they go to an external spelling/grammar
//! checker and places the checker's unpositioned reports back onto
//! line/column ranges of the original text.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod atd;
pub mod locate;
pub mod normalize;
pub mod reconcile;
pub mod settings;
pub mod severity;

pub use locate::{locate, OccurrenceLocator};
pub use normalize::{IgnorePattern, Normalizer};
pub use reconcile::{
    line_column, reconcile, OccurrenceCounter, OccurrenceKey, Problem, RawMatch, SuggestionList,
};
pub use settings::{language_name, Settings, LANGUAGES};
pub use severity::{severity_of, Severity};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid ignore pattern `{pattern}`: {reason}")]
    Config { pattern: String, reason: String },

    #[error("failed to read settings at {}: {source}", path.display())]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings at {}: {source}", path.display())]
    SettingsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write settings at {}: {source}", path.display())]
    SettingsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unsupported language `{0}`")]
    UnsupportedLanguage(String),

    #[error("checker failed: {0}")]
    Checker(String),
}

/// A problem together with the severity it should be shown at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(flatten)]
    pub problem: Problem,
    pub severity: Severity,
}

/// Compiled settings for one checking session. Rebuilt whenever settings change.
#[derive(Debug)]
pub struct Speller {
    settings: Settings,
    normalizer: Normalizer,
}

impl Speller {
    pub fn new(settings: Settings) -> Self {
        let normalizer = Normalizer::new(&settings.ignore_reg_exp);
        Self {
            settings,
            normalizer,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Ignore patterns that were skipped because they failed to compile.
    pub fn config_errors(&self) -> &[Error] {
        self.normalizer.errors()
    }

    pub fn is_applicable(&self, kind: &str) -> bool {
        self.settings.is_applicable(kind)
    }

    pub fn normalize(&self, text: &str) -> String {
        self.normalizer.normalize(text)
    }

    pub fn reconcile(&self, normalized: &str, raw_matches: &[RawMatch]) -> Vec<Problem> {
        reconcile(normalized, raw_matches, &self.settings.ignore_words_list)
    }

    /// Positioned problems with their severity; disabled categories are dropped.
    pub fn diagnose(&self, normalized: &str, raw_matches: &[RawMatch]) -> Vec<Diagnostic> {
        self.reconcile(normalized, raw_matches)
            .into_iter()
            .filter_map(|problem| {
                let severity = severity_of(
                    &problem.category,
                    &self.settings.mistake_type_to_status,
                    self.settings.default_status,
                );
                if severity.is_disabled() {
                    return None;
                }
                Some(Diagnostic { problem, severity })
            })
            .collect()
    }
}

impl Default for Speller {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
