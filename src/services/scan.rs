//! Discovery of installed game versions, accounts, realms and characters.
//!
//! The scan only reads the filesystem. It walks
//! `<wow>/<version>/WTF/Account/<account>/<realm>/<character>` and skips
//! dot-prefixed entries and the account-wide `SavedVariables` folder.

use crate::error::{Result, SyncError};
use crate::models::game::{ACCOUNT_DIR, SAVED_VARIABLES_DIR, SETTINGS_DIR};
use crate::models::{CharacterRef, ContentKind, GameVersion, ScanResult, SyncPath};
use camino::Utf8Path;
use std::io;

/// Scan a WoW installation.
///
/// A missing installation path is not an error: the result is simply empty.
pub fn scan_installation(wow_path: &Utf8Path) -> Result<ScanResult> {
    let mut result = ScanResult::default();

    if !wow_path.is_dir() {
        tracing::debug!("WoW path {} does not exist, nothing to scan", wow_path);
        return Ok(result);
    }

    for version in GameVersion::ALL {
        let version_path = wow_path.join(version.dir_name());
        if !version_path.is_dir() {
            continue;
        }
        result.versions.push(version);

        let account_root = version_path.join(SETTINGS_DIR).join(ACCOUNT_DIR);
        if !account_root.is_dir() {
            continue;
        }

        let mut accounts = Vec::new();
        for account in visible_subdirs(&account_root)? {
            let account_path = account_root.join(&account);

            for realm in visible_subdirs(&account_path)? {
                if realm == SAVED_VARIABLES_DIR {
                    continue;
                }
                for character in visible_subdirs(&account_path.join(&realm))? {
                    let c = CharacterRef::new(version, account.clone(), realm.clone(), character);
                    result.characters.insert(c.key(), c);
                }
            }
            accounts.push(account);
        }

        if !accounts.is_empty() {
            result.accounts.insert(version, accounts);
        }
    }

    tracing::info!(
        "Scanned {}: {} version(s), {} account(s), {} character(s)",
        wow_path,
        result.versions.len(),
        result.accounts.values().map(Vec::len).sum::<usize>(),
        result.characters.len()
    );

    Ok(result)
}

/// Sync paths for the enabled versions that exist in the installation.
pub fn sync_paths(wow_path: &Utf8Path, enabled: &[GameVersion]) -> Vec<SyncPath> {
    let mut paths = Vec::new();
    for version in GameVersion::ALL {
        if !enabled.contains(&version) {
            continue;
        }
        let version_path = wow_path.join(version.dir_name());
        if !version_path.is_dir() {
            continue;
        }
        for kind in [ContentKind::Settings, ContentKind::Addons] {
            let source = version_path.join(kind.install_rel_path());
            if source.is_dir() {
                paths.push(SyncPath {
                    kind,
                    source,
                    version,
                });
            }
        }
    }
    paths
}

/// Names of non-hidden subdirectories, sorted for stable output.
fn visible_subdirs(dir: &Utf8Path) -> Result<Vec<String>> {
    let entries = dir.read_dir_utf8().map_err(|e| SyncError::fs(dir, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!("Skipping non UTF-8 entry in {}", dir);
                continue;
            }
            Err(e) => return Err(SyncError::fs(dir, e)),
        };
        let name = entry.file_name();
        if name.starts_with('.') {
            continue;
        }
        if entry.path().is_dir() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
