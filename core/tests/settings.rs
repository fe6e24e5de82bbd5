use std::fs;

use mdspell_core::{Error, Settings, Severity};

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::load(&Settings::path_in(dir.path())).unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
fn saved_settings_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = Settings::path_in(dir.path());

    let mut settings = Settings::default();
    settings.add_ignore_word("mdspell");
    settings.set_language("es").unwrap();
    settings
        .mistake_type_to_status
        .insert("Spelling".into(), Severity::Hint);
    settings.save(&path).unwrap();

    assert!(path.ends_with(".vscode/spell.json"));
    assert_eq!(Settings::load(&path).unwrap(), settings);
}

#[test]
fn partial_file_fills_in_field_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spell.json");
    fs::write(
        &path,
        r#"{
  "language": "pt",
  "mistakeTypeToStatus": { "Spelling": "Warning", "Cliches": "Disable" },
  "ignoreRegExp": ["/TODO/g"]
}"#,
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.language, "pt");
    assert_eq!(settings.ignore_reg_exp, vec!["/TODO/g"]);
    assert_eq!(settings.language_ids, vec!["markdown", "plaintext"]);
    assert!(settings.ignore_words_list.is_empty());
    assert_eq!(settings.mistake_type_to_status.len(), 2);
}

#[test]
fn malformed_file_is_an_error_and_degrades_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spell.json");
    fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        Settings::load(&path),
        Err(Error::SettingsParse { .. })
    ));
    assert_eq!(Settings::load_or_default(&path), Settings::default());
}
