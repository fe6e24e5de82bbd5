//! Project settings persisted as `.vscode/spell.json`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{severity::lenient_severity_map, Error, Severity};

pub const SETTINGS_DIR: &str = ".vscode";
pub const SETTINGS_FILE: &str = "spell.json";

/// Languages the checking service understands, with display names.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("fr", "French"),
    ("de", "German"),
    ("pt", "Portuguese"),
    ("es", "Spanish"),
];

/// Display name for a language code, `English` for anything unknown.
pub fn language_name(code: &str) -> &'static str {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or("English")
}

/// User-editable checker settings. Fields missing from a settings file take
/// their built-in default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub language: String,
    pub ignore_words_list: BTreeSet<String>,
    #[serde(deserialize_with = "lenient_severity_map")]
    pub mistake_type_to_status: BTreeMap<String, Severity>,
    pub default_status: Severity,
    #[serde(rename = "languageIDs")]
    pub language_ids: Vec<String>,
    pub ignore_reg_exp: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let mistake_type_to_status = [
            ("Passive voice", Severity::Hint),
            ("Spelling", Severity::Error),
            ("Complex Expression", Severity::Disable),
            ("Hidden Verbs", Severity::Information),
            ("Hyphen Required", Severity::Disable),
            ("Redundant Expression", Severity::Disable),
            ("Did you mean...", Severity::Disable),
            ("Repeated Word", Severity::Warning),
            ("Missing apostrophe", Severity::Warning),
            ("Cliches", Severity::Disable),
            ("Missing Word", Severity::Disable),
            ("Make I uppercase", Severity::Warning),
        ]
        .into_iter()
        .map(|(category, severity)| (category.to_string(), severity))
        .collect();

        Self {
            language: "en".into(),
            ignore_words_list: BTreeSet::new(),
            mistake_type_to_status,
            default_status: Severity::Information,
            language_ids: vec!["markdown".into(), "plaintext".into()],
            ignore_reg_exp: vec![
                r"/```[\s\S]*?```/g".into(),
                r"/\(.*\.(jpg|jpeg|png|md|gif|JPG|JPEG|PNG|MD|GIF)\)/g".into(),
                r"/\b(http|https|ftp|git)://\S*/g".into(),
            ],
        }
    }
}

impl Settings {
    /// Settings file location inside a workspace root.
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    /// Read settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| Error::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| Error::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`Settings::load`], but an unreadable file degrades to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(%err, "using default settings");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let write_err = |source| Error::SettingsWrite {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut text =
            serde_json::to_string_pretty(self).map_err(|err| write_err(err.into()))?;
        text.push('\n');
        fs::write(path, text).map_err(write_err)?;
        tracing::debug!(path = %path.display(), "settings written");
        Ok(())
    }

    /// Returns `false` when the word was already ignored.
    pub fn add_ignore_word(&mut self, word: &str) -> bool {
        let word = word.trim();
        if word.is_empty() {
            return false;
        }
        self.ignore_words_list.insert(word.to_string())
    }

    /// Returns `false` when `code` is already the active language.
    pub fn set_language(&mut self, code: &str) -> Result<bool, Error> {
        let code = code.trim();
        if !LANGUAGES.iter().any(|(c, _)| *c == code) {
            return Err(Error::UnsupportedLanguage(code.to_string()));
        }
        if self.language == code {
            return Ok(false);
        }
        self.language = code.to_string();
        Ok(true)
    }

    pub fn is_applicable(&self, kind: &str) -> bool {
        self.language_ids.iter().any(|id| id == kind)
    }

    pub fn is_ignored(&self, word: &str) -> bool {
        self.ignore_words_list.contains(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "language": "de", "ignoreWordsList": ["Rust"] }"#).unwrap();
        assert_eq!(settings.language, "de");
        assert!(settings.is_ignored("Rust"));
        assert_eq!(settings.language_ids, Settings::default().language_ids);
        assert_eq!(settings.ignore_reg_exp, Settings::default().ignore_reg_exp);
        assert_eq!(settings.default_status, Severity::Information);
    }

    #[test]
    fn unknown_status_names_are_dropped() {
        let settings: Settings = serde_json::from_str(
            r#"{ "mistakeTypeToStatus": { "Spelling": "Loud", "Repeated Word": "Hint" } }"#,
        )
        .unwrap();
        assert!(!settings.mistake_type_to_status.contains_key("Spelling"));
        assert_eq!(
            settings.mistake_type_to_status.get("Repeated Word"),
            Some(&Severity::Hint)
        );
    }

    #[test]
    fn field_names_match_settings_file() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        for key in [
            "language",
            "ignoreWordsList",
            "mistakeTypeToStatus",
            "defaultStatus",
            "languageIDs",
            "ignoreRegExp",
        ] {
            assert!(value.get(key).is_some(), "missing `{key}`");
        }
    }

    #[test]
    fn add_ignore_word_is_deduplicated() {
        let mut settings = Settings::default();
        assert!(settings.add_ignore_word("teh"));
        assert!(!settings.add_ignore_word("teh"));
        assert!(!settings.add_ignore_word("  "));
        assert_eq!(settings.ignore_words_list.len(), 1);
    }

    #[test]
    fn set_language_rejects_unknown_codes() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.set_language("xx"),
            Err(Error::UnsupportedLanguage(_))
        ));
        assert_eq!(settings.set_language("fr").unwrap(), true);
        assert_eq!(settings.set_language("fr").unwrap(), false);
        assert_eq!(language_name(&settings.language), "French");
    }

    #[test]
    fn applicability_follows_language_ids() {
        let settings = Settings::default();
        assert!(settings.is_applicable("markdown"));
        assert!(settings.is_applicable("plaintext"));
        assert!(!settings.is_applicable("rust"));
    }
}
