//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Configuration loading and saving
//! - Defaults for missing, partial and corrupt files
//! - Selection persistence (implicit "sync everything" vs explicit choice)
//! - Validation of the settings a sync needs

use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;
use wowsync::models::validate_repo_url;
use wowsync::{AppConfig, CharacterRef, ConfigManager, GameVersion, Selection, SyncError};

fn create_test_app_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let app_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, app_dir)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, app_dir) = create_test_app_dir();
    let manager = ConfigManager::new(&app_dir).unwrap();

    assert_eq!(manager.app_dir(), &app_dir);
    assert_eq!(manager.config_path(), app_dir.join("config.json"));
    assert_eq!(manager.repo_path(), app_dir.join("repo"));
    assert_eq!(manager.token_path(), app_dir.join("github_token.json"));
    assert_eq!(manager.lock_path(), app_dir.join("app.lock"));
}

#[test]
fn test_new_creates_missing_app_dir() {
    let (_temp_dir, root) = create_test_app_dir();
    let app_dir = root.join("nested").join(".wow_sync");

    ConfigManager::new(&app_dir).unwrap();
    assert!(app_dir.is_dir());
}

#[test]
fn test_load_default_config() {
    let (_temp_dir, app_dir) = create_test_app_dir();
    let manager = ConfigManager::new(&app_dir).unwrap();

    // Config file doesn't exist, should return defaults
    let config = manager.load_config().unwrap();

    assert_eq!(config.wow_path, "");
    assert_eq!(config.git_repo_url, "");
    assert!(!config.sync_config_wtf);
    assert!(config.sync_retail);
    assert!(config.sync_classic);
    assert!(config.sync_classic_era);
    assert!(config.auto_sync);
    assert_eq!(config.selection, Selection::AllIncluded);
}

#[test]
fn test_save_and_load_config() {
    let (_temp_dir, app_dir) = create_test_app_dir();
    let manager = ConfigManager::new(&app_dir).unwrap();

    let mut config = AppConfig {
        wow_path: "/games/World of Warcraft".to_string(),
        git_repo_url: "git@github.com:user/wow-settings.git".to_string(),
        sync_config_wtf: true,
        ..Default::default()
    };
    config.set_version_enabled(GameVersion::ClassicEra, false);
    manager.save_config(&config).unwrap();

    let loaded = manager.load_config().unwrap();
    assert_eq!(loaded, config);
    assert_eq!(
        loaded.enabled_versions(),
        vec![GameVersion::Retail, GameVersion::Classic]
    );
}

#[test]
fn test_partial_config_fills_defaults() {
    let (_temp_dir, app_dir) = create_test_app_dir();
    let manager = ConfigManager::new(&app_dir).unwrap();

    fs::write(
        manager.config_path(),
        r#"{ "wow_path": "/games/wow", "sync_classic": false }"#,
    )
    .unwrap();

    let config = manager.load_config().unwrap();
    assert_eq!(config.wow_path, "/games/wow");
    assert!(!config.sync_classic);
    assert!(config.sync_retail);
    assert!(config.auto_sync);
    assert_eq!(config.selection, Selection::AllIncluded);
}

#[test]
fn test_corrupt_config_yields_defaults() {
    let (_temp_dir, app_dir) = create_test_app_dir();
    let manager = ConfigManager::new(&app_dir).unwrap();

    fs::write(manager.config_path(), "{ not json").unwrap();

    let config = manager.load_config().unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_save_leaves_no_temp_file() {
    let (_temp_dir, app_dir) = create_test_app_dir();
    let manager = ConfigManager::new(&app_dir).unwrap();

    manager.save_config(&AppConfig::default()).unwrap();

    let names: Vec<String> = fs::read_dir(&app_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["config.json".to_string()]);
}

#[test]
fn test_update_persists_changes() {
    let (_temp_dir, app_dir) = create_test_app_dir();
    let manager = ConfigManager::new(&app_dir).unwrap();

    let updated = manager
        .update(|config| config.wow_path = "/games/wow".to_string())
        .unwrap();
    assert_eq!(updated.wow_path, "/games/wow");

    let reloaded = manager.load_config().unwrap();
    assert_eq!(reloaded.wow_path, "/games/wow");
}

#[test]
fn test_explicit_selection_round_trip() {
    let (_temp_dir, app_dir) = create_test_app_dir();
    let manager = ConfigManager::new(&app_dir).unwrap();

    let hero = CharacterRef::new(GameVersion::Retail, "ACC1", "Silvermoon", "Hero");
    let alt = CharacterRef::new(GameVersion::Retail, "ACC2", "Silvermoon", "Alt");
    manager
        .update(|config| config.selection.replace([hero.clone()]))
        .unwrap();

    let selection = manager.load_config().unwrap().selection;
    assert!(selection.has_explicit_selection());
    assert!(selection.is_character_included(&hero));
    assert!(!selection.is_character_included(&alt));
    assert!(selection.is_account_selected(GameVersion::Retail, "ACC1"));
    assert!(!selection.is_account_selected(GameVersion::Retail, "ACC2"));
    assert_eq!(selection.character_count(GameVersion::Retail), Some(1));
}

#[test]
fn test_empty_explicit_selection_is_not_all_included() {
    let (_temp_dir, app_dir) = create_test_app_dir();
    let manager = ConfigManager::new(&app_dir).unwrap();

    // A saved empty selection must not fall back to "sync everything"
    manager
        .update(|config| config.selection.replace(Vec::<CharacterRef>::new()))
        .unwrap();

    let selection = manager.load_config().unwrap().selection;
    let hero = CharacterRef::new(GameVersion::Retail, "ACC1", "Silvermoon", "Hero");
    assert!(selection.has_explicit_selection());
    assert!(!selection.is_character_included(&hero));
    assert_eq!(selection.character_count(GameVersion::Retail), Some(0));
    assert_eq!(
        selection.account_allow_list(GameVersion::Retail),
        Some(Default::default())
    );
}

#[test]
fn test_validate_requires_install_path_and_url() {
    let mut config = AppConfig::default();
    assert!(matches!(
        config.validate(),
        Err(SyncError::MissingInstallPath)
    ));

    config.wow_path = "/games/wow".to_string();
    assert!(matches!(config.validate(), Err(SyncError::MissingRepoUrl)));

    config.git_repo_url = "https://github.com/user/wow-settings.git".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_repo_url_forms() {
    assert!(validate_repo_url("https://github.com/user/repo.git").is_ok());
    assert!(validate_repo_url("git@github.com:user/repo.git").is_ok());
    assert!(validate_repo_url("ssh://git@example.com/repo.git").is_ok());
    assert!(validate_repo_url("/srv/git/wow.git").is_ok());

    assert!(matches!(
        validate_repo_url("   "),
        Err(SyncError::MissingRepoUrl)
    ));
    assert!(matches!(
        validate_repo_url("ftp://example.com/repo"),
        Err(SyncError::InvalidRepoUrl(_))
    ));
}
