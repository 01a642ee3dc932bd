use crate::models::AppConfig;
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Name of the per-user application directory under the home directory.
pub const APP_DIR_NAME: &str = ".wow_sync";

/// Configuration manager for the per-user application directory.
///
/// Owns the layout of `~/.wow_sync`:
/// - `config.json`: user settings and the character selection
/// - `repo/`: the local git working tree
/// - `github_token.json`: persisted access token
/// - `app.lock`: single-instance lock
/// - `logs/`: rotating log files
#[derive(Debug, Clone)]
pub struct ConfigManager {
    app_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at `app_dir`, creating it if needed.
    pub fn new<P: AsRef<Utf8Path>>(app_dir: P) -> Result<Self> {
        let app_dir = app_dir.as_ref().to_path_buf();

        if !app_dir.exists() {
            fs::create_dir_all(&app_dir)
                .with_context(|| format!("Failed to create app directory: {}", app_dir))?;
        }

        Ok(Self {
            config_path: app_dir.join("config.json"),
            app_dir,
        })
    }

    /// `~/.wow_sync`
    pub fn default_app_dir() -> Result<Utf8PathBuf> {
        let home = dirs::home_dir().ok_or(anyhow!("cannot determine path to home directory"))?;
        let home = Utf8PathBuf::try_from(home).context("Home directory is not valid UTF-8")?;
        Ok(home.join(APP_DIR_NAME))
    }

    /// Load the configuration, merging missing keys to their defaults.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return Ok(AppConfig::default());
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        match serde_json::from_str::<AppConfig>(&file_contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", self.config_path);
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    "Config file {} is corrupt ({}), using defaults",
                    self.config_path,
                    e
                );
                Ok(AppConfig::default())
            }
        }
    }

    /// Save the whole configuration object.
    ///
    /// Written to a sibling temp file first and renamed into place so a crash
    /// never leaves a half-written config behind.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let json =
            serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")?;

        let tmp_path = self.config_path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write config: {}", tmp_path))?;
        fs::rename(&tmp_path, &self.config_path)
            .with_context(|| format!("Failed to replace config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Load, modify and save in one step.
    pub fn update<F>(&self, update_fn: F) -> Result<AppConfig>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.load_config()?;
        update_fn(&mut config);
        self.save_config(&config)?;
        Ok(config)
    }

    pub fn app_dir(&self) -> &Utf8Path {
        &self.app_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    pub fn repo_path(&self) -> Utf8PathBuf {
        self.app_dir.join("repo")
    }

    pub fn token_path(&self) -> Utf8PathBuf {
        self.app_dir.join("github_token.json")
    }

    pub fn lock_path(&self) -> Utf8PathBuf {
        self.app_dir.join("app.lock")
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.app_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CharacterRef, GameVersion};
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.repo_path().ends_with("repo"));
        assert!(manager.token_path().ends_with("github_token.json"));
    }

    #[test]
    fn test_load_missing_config_gives_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert_eq!(manager.load_config().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_save_writes_every_key() {
        let (manager, _temp_dir) = create_test_config_manager();
        manager.save_config(&AppConfig::default()).unwrap();

        let raw = fs::read_to_string(manager.config_path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for key in [
            "wow_path",
            "git_repo_url",
            "sync_config_wtf",
            "sync_retail",
            "sync_classic",
            "sync_classic_era",
            "auto_sync",
            "selection",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn test_update_roundtrip() {
        let (manager, _temp_dir) = create_test_config_manager();

        manager
            .update(|config| {
                config.wow_path = "/games/wow".into();
                config.selection.replace(vec![CharacterRef::new(
                    GameVersion::Retail,
                    "ACC",
                    "Realm",
                    "Hero",
                )]);
            })
            .unwrap();

        let loaded = manager.load_config().unwrap();
        assert_eq!(loaded.wow_path, "/games/wow");
        assert!(loaded.selection.has_explicit_selection());
        assert!(!manager.config_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_config_falls_back_to_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.config_path(), "{ not json").unwrap();
        assert_eq!(manager.load_config().unwrap(), AppConfig::default());
    }
}
