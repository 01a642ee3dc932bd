use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory holding user, account and character settings inside a version folder.
pub const SETTINGS_DIR: &str = "WTF";

/// Account-level directory beneath [`SETTINGS_DIR`].
pub const ACCOUNT_DIR: &str = "Account";

/// Excluded from sync at the settings root and never treated as a realm.
pub const SAVED_VARIABLES_DIR: &str = "SavedVariables";

/// Game client settings file (matched case-insensitively).
pub const SETTINGS_FILE: &str = "Config.wtf";

/// Addons directory name inside the repository.
pub const REPO_ADDONS_DIR: &str = "AddOns";

/// Separator used in character keys; never appears in game-assigned names.
pub const KEY_SEPARATOR: char = ':';

/// Installed game flavour. The set is closed and each maps to a folder
/// inside the WoW installation and the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GameVersion {
    #[serde(rename = "_retail_")]
    Retail,
    #[serde(rename = "_classic_")]
    Classic,
    #[serde(rename = "_classic_era_")]
    ClassicEra,
}

impl GameVersion {
    pub const ALL: [GameVersion; 3] = [
        GameVersion::Retail,
        GameVersion::Classic,
        GameVersion::ClassicEra,
    ];

    /// Folder name in the installation and in the repository
    pub fn dir_name(self) -> &'static str {
        match self {
            GameVersion::Retail => "_retail_",
            GameVersion::Classic => "_classic_",
            GameVersion::ClassicEra => "_classic_era_",
        }
    }

    /// Human readable name
    pub fn label(self) -> &'static str {
        match self {
            GameVersion::Retail => "Retail",
            GameVersion::Classic => "Classic",
            GameVersion::ClassicEra => "Classic Era",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.dir_name() == name)
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One character's save-data folder, as found by a scan.
///
/// Only the key string is persisted (inside a selection); the full reference
/// is rebuilt on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacterRef {
    pub version: GameVersion,
    pub account: String,
    pub realm: String,
    pub character: String,
}

impl CharacterRef {
    pub fn new(
        version: GameVersion,
        account: impl Into<String>,
        realm: impl Into<String>,
        character: impl Into<String>,
    ) -> Self {
        Self {
            version,
            account: account.into(),
            realm: realm.into(),
            character: character.into(),
        }
    }

    /// `<version-dir>:<account>:<realm>:<character>`
    pub fn key(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.version.dir_name(),
            self.account,
            self.realm,
            self.character,
            sep = KEY_SEPARATOR
        )
    }

    /// Parse a key produced by [`CharacterRef::key`].
    pub fn parse_key(key: &str) -> Option<Self> {
        let mut parts = key.splitn(4, KEY_SEPARATOR);
        let version = GameVersion::from_dir_name(parts.next()?)?;
        let account = parts.next()?;
        let realm = parts.next()?;
        let character = parts.next()?;
        if account.is_empty() || realm.is_empty() || character.is_empty() {
            return None;
        }
        Some(Self::new(version, account, realm, character))
    }
}

/// Which tree a [`SyncPath`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// The `WTF` tree, filtered by selection
    Settings,
    /// The `Interface/AddOns` tree, never filtered
    Addons,
}

impl ContentKind {
    /// Subdirectory name under `<repo>/<version-dir>/`
    pub fn repo_dir_name(self) -> &'static str {
        match self {
            ContentKind::Settings => SETTINGS_DIR,
            ContentKind::Addons => REPO_ADDONS_DIR,
        }
    }

    /// Path of this tree relative to `<wow>/<version-dir>/`
    pub fn install_rel_path(self) -> Utf8PathBuf {
        match self {
            ContentKind::Settings => Utf8PathBuf::from(SETTINGS_DIR),
            ContentKind::Addons => Utf8PathBuf::from("Interface").join(REPO_ADDONS_DIR),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.repo_dir_name())
    }
}

/// One directory tree taking part in a sync pass. Computed fresh each pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPath {
    pub kind: ContentKind,
    pub source: Utf8PathBuf,
    pub version: GameVersion,
}

/// Everything a scan of the installation discovered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    /// Version folders present on disk
    pub versions: Vec<GameVersion>,
    /// Accounts per version; versions without accounts are absent
    pub accounts: IndexMap<GameVersion, Vec<String>>,
    /// Characters keyed by [`CharacterRef::key`]
    pub characters: IndexMap<String, CharacterRef>,
}

impl ScanResult {
    pub fn characters_for(&self, version: GameVersion) -> impl Iterator<Item = &CharacterRef> {
        self.characters.values().filter(move |c| c.version == version)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_dir_names() {
        assert_eq!(GameVersion::Retail.dir_name(), "_retail_");
        assert_eq!(GameVersion::Classic.dir_name(), "_classic_");
        assert_eq!(GameVersion::ClassicEra.dir_name(), "_classic_era_");
        assert_eq!(
            GameVersion::from_dir_name("_classic_era_"),
            Some(GameVersion::ClassicEra)
        );
        assert_eq!(GameVersion::from_dir_name("_ptr_"), None);
    }

    #[test]
    fn test_version_serializes_as_dir_name() {
        let json = serde_json::to_string(&GameVersion::ClassicEra).unwrap();
        assert_eq!(json, "\"_classic_era_\"");
    }

    #[test]
    fn test_character_key_format() {
        let c = CharacterRef::new(GameVersion::Retail, "ACCOUNT1", "Silvermoon", "Thrall");
        assert_eq!(c.key(), "_retail_:ACCOUNT1:Silvermoon:Thrall");
        assert_eq!(CharacterRef::parse_key(&c.key()), Some(c));
    }

    #[test]
    fn test_parse_key_rejects_garbage() {
        assert_eq!(CharacterRef::parse_key("_retail_:ACCOUNT1:Silvermoon"), None);
        assert_eq!(CharacterRef::parse_key("retail:A:B:C"), None);
        assert_eq!(CharacterRef::parse_key("_retail_::B:C"), None);
    }

    #[test]
    fn test_install_paths() {
        assert_eq!(ContentKind::Settings.install_rel_path(), Utf8PathBuf::from("WTF"));
        assert_eq!(
            ContentKind::Addons.install_rel_path(),
            Utf8PathBuf::from("Interface").join("AddOns")
        );
        assert_eq!(ContentKind::Addons.repo_dir_name(), "AddOns");
    }
}
