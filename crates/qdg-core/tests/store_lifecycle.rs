use pretty_assertions::assert_eq;
use tempfile::TempDir;

use qdg_core::config::{load_settings, save_settings, Settings, SettingsPatch};
use qdg_core::identity::config_path;
use qdg_core::store::initialize_store;

#[test]
fn initializing_twice_leaves_config_untouched() {
    let temp = TempDir::new().expect("tempdir");
    let first = initialize_store(temp.path());
    assert!(first.config_created);
    let after_first = std::fs::read_to_string(config_path(temp.path())).expect("config");

    let second = initialize_store(temp.path());
    assert!(!second.config_created);
    assert!(second.is_complete());
    let after_second = std::fs::read_to_string(config_path(temp.path())).expect("config");
    assert_eq!(after_first, after_second);
}

#[test]
fn settings_round_trip_keeps_other_fields() {
    let temp = TempDir::new().expect("tempdir");
    initialize_store(temp.path());
    assert_eq!(load_settings(temp.path()), Settings::default());

    let saved = save_settings(
        temp.path(),
        &SettingsPatch {
            dimension_count: Some(7),
            expected_score: None,
        },
    )
    .expect("save");
    assert_eq!(saved.dimension_count, 7);
    assert_eq!(saved.expected_score, 8.0);
    assert_eq!(load_settings(temp.path()), saved);
}

#[test]
fn rejected_patch_leaves_settings_unchanged() {
    let temp = TempDir::new().expect("tempdir");
    initialize_store(temp.path());
    let before = std::fs::read_to_string(config_path(temp.path())).expect("config");
    let result = save_settings(
        temp.path(),
        &SettingsPatch {
            dimension_count: Some(6),
            expected_score: Some(11.0),
        },
    );
    assert!(result.is_err());
    let after = std::fs::read_to_string(config_path(temp.path())).expect("config");
    assert_eq!(before, after);
}
