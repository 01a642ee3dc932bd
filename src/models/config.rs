use crate::error::{Result, SyncError};
use crate::models::game::GameVersion;
use crate::models::selection::Selection;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// scp-style remote, e.g. `git@github.com:user/wow-settings.git`
static SCP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+@[\w.-]+:[^\s]+$").expect("Invalid scp URL regex"));

static SCHEME_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(https?|ssh|git|file)://\S+$").expect("Invalid URL regex"));

/// User configuration persisted as `config.json`.
///
/// Missing keys fall back to their defaults on load; every key is written on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub wow_path: String,
    pub git_repo_url: String,
    pub sync_config_wtf: bool,
    pub sync_retail: bool,
    pub sync_classic: bool,
    pub sync_classic_era: bool,
    pub auto_sync: bool,
    pub selection: Selection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            wow_path: String::new(),
            git_repo_url: String::new(),
            sync_config_wtf: false,
            sync_retail: true,
            sync_classic: true,
            sync_classic_era: true,
            auto_sync: true,
            selection: Selection::AllIncluded,
        }
    }
}

impl AppConfig {
    pub fn is_version_enabled(&self, version: GameVersion) -> bool {
        match version {
            GameVersion::Retail => self.sync_retail,
            GameVersion::Classic => self.sync_classic,
            GameVersion::ClassicEra => self.sync_classic_era,
        }
    }

    pub fn set_version_enabled(&mut self, version: GameVersion, enabled: bool) {
        match version {
            GameVersion::Retail => self.sync_retail = enabled,
            GameVersion::Classic => self.sync_classic = enabled,
            GameVersion::ClassicEra => self.sync_classic_era = enabled,
        }
    }

    pub fn enabled_versions(&self) -> Vec<GameVersion> {
        GameVersion::ALL
            .into_iter()
            .filter(|v| self.is_version_enabled(*v))
            .collect()
    }

    pub fn wow_path(&self) -> Option<&Utf8Path> {
        let trimmed = self.wow_path.trim();
        (!trimmed.is_empty()).then(|| Utf8Path::new(trimmed))
    }

    /// Check the settings a sync needs before touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.wow_path().is_none() {
            return Err(SyncError::MissingInstallPath);
        }
        validate_repo_url(&self.git_repo_url)?;
        Ok(())
    }

    /// Snapshot of the settings that shape a sync pass.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            enabled_versions: self.enabled_versions(),
            sync_settings_file: self.sync_config_wtf,
            selection: self.selection.clone(),
        }
    }
}

/// Validate a remote URL; returns the trimmed form.
pub fn validate_repo_url(url: &str) -> Result<&str> {
    let url = url.trim();
    if url.is_empty() {
        return Err(SyncError::MissingRepoUrl);
    }
    if url.contains("://") {
        if SCHEME_URL.is_match(url) {
            return Ok(url);
        }
        return Err(SyncError::InvalidRepoUrl(url.to_string()));
    }
    if SCP_URL.is_match(url) {
        return Ok(url);
    }
    // Plain filesystem path to a repository
    if !url.chars().any(char::is_whitespace) || Utf8PathBuf::from(url).is_absolute() {
        return Ok(url);
    }
    Err(SyncError::InvalidRepoUrl(url.to_string()))
}

/// Inputs to a sync pass that come from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub enabled_versions: Vec<GameVersion>,
    pub sync_settings_file: bool,
    pub selection: Selection,
}

impl SyncSettings {
    pub fn is_version_enabled(&self, version: GameVersion) -> bool {
        self.enabled_versions.contains(&version)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        AppConfig::default().sync_settings()
    }
}
