//! Exclusion rules for the settings tree.
//!
//! The rules depend on where in the tree a directory sits, so the copy engine
//! carries a [`DirContext`] down every recursion step instead of inspecting
//! path strings. All rules are additive:
//!
//! 1. `SavedVariables` directly under the settings root is always excluded.
//! 2. `Config.wtf` (any case, any depth) is excluded unless settings-file sync is on.
//! 3. Under `Account`, directories not in the account allow-list are excluded.
//! 4. Under a realm directory, character directories not selected for that
//!    `(account, realm)` pair are excluded. A pair with no selected characters
//!    excludes nothing.

use crate::models::game::{ACCOUNT_DIR, SAVED_VARIABLES_DIR, SETTINGS_FILE};
use crate::models::{ContentKind, GameVersion, RealmCharacters, SyncSettings};
use std::collections::{BTreeSet, HashSet};

/// Position of a directory inside a synced tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirContext {
    /// A tree no rule applies to (addons)
    Unfiltered,
    /// The `WTF` directory itself
    SettingsRoot,
    /// `WTF/Account`
    AccountList,
    /// `WTF/Account/<account>`
    Account { account: String },
    /// `WTF/Account/<account>/<realm>`
    Realm { account: String, realm: String },
    /// Anywhere else inside the settings tree
    Other,
}

impl DirContext {
    /// Context of the subdirectory `name` of a directory in this context.
    pub fn child(&self, name: &str) -> DirContext {
        match self {
            DirContext::Unfiltered => DirContext::Unfiltered,
            DirContext::SettingsRoot if name == ACCOUNT_DIR => DirContext::AccountList,
            DirContext::AccountList => DirContext::Account {
                account: name.to_string(),
            },
            DirContext::Account { account } if name != SAVED_VARIABLES_DIR => DirContext::Realm {
                account: account.clone(),
                realm: name.to_string(),
            },
            _ => DirContext::Other,
        }
    }
}

/// A directory entry as seen by the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub is_dir: bool,
}

impl EntryInfo {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Exclusion predicate for one synced tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeFilter {
    sync_settings_file: bool,
    accounts: Option<BTreeSet<String>>,
    characters: Option<RealmCharacters>,
    unfiltered: bool,
}

impl TreeFilter {
    /// Filter that excludes nothing.
    pub fn passthrough() -> Self {
        Self {
            unfiltered: true,
            ..Default::default()
        }
    }

    /// Filter for a settings tree.
    pub fn settings(
        sync_settings_file: bool,
        accounts: Option<BTreeSet<String>>,
        characters: Option<RealmCharacters>,
    ) -> Self {
        Self {
            sync_settings_file,
            accounts,
            characters,
            unfiltered: false,
        }
    }

    /// Filter for one content kind of one version under the given settings.
    pub fn for_sync(kind: ContentKind, version: GameVersion, settings: &SyncSettings) -> Self {
        match kind {
            ContentKind::Addons => Self::passthrough(),
            ContentKind::Settings => Self::settings(
                settings.sync_settings_file,
                settings.selection.account_allow_list(version),
                settings.selection.character_allow_list(version),
            ),
        }
    }

    /// Context of the directory a copy starts at.
    pub fn root_context(&self) -> DirContext {
        if self.unfiltered {
            DirContext::Unfiltered
        } else {
            DirContext::SettingsRoot
        }
    }

    /// Names among `entries` that must not be synced from a directory in `ctx`.
    pub fn excluded(&self, ctx: &DirContext, entries: &[EntryInfo]) -> HashSet<String> {
        let mut excluded = HashSet::new();
        if matches!(ctx, DirContext::Unfiltered) {
            return excluded;
        }

        // Rule 1
        if *ctx == DirContext::SettingsRoot {
            excluded.extend(
                entries
                    .iter()
                    .filter(|e| e.name == SAVED_VARIABLES_DIR)
                    .map(|e| e.name.clone()),
            );
        }

        // Rule 2
        if !self.sync_settings_file {
            excluded.extend(
                entries
                    .iter()
                    .filter(|e| e.name.eq_ignore_ascii_case(SETTINGS_FILE))
                    .map(|e| e.name.clone()),
            );
        }

        // Rule 3
        if let (DirContext::AccountList, Some(allowed)) = (ctx, &self.accounts) {
            excluded.extend(
                entries
                    .iter()
                    .filter(|e| e.is_dir && !allowed.contains(&e.name))
                    .map(|e| e.name.clone()),
            );
        }

        // Rule 4
        if let (DirContext::Realm { account, realm }, Some(characters)) = (ctx, &self.characters) {
            let selected = characters.get(&(account.clone(), realm.clone()));
            if let Some(selected) = selected.filter(|s| !s.is_empty()) {
                excluded.extend(
                    entries
                        .iter()
                        .filter(|e| e.is_dir && !selected.contains(&e.name))
                        .map(|e| e.name.clone()),
                );
            }
        }

        excluded
    }

    /// Short description of the active filters for progress logs.
    pub fn describe(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if self.unfiltered {
            return parts;
        }
        if !self.sync_settings_file {
            parts.push(format!("{} excluded", SETTINGS_FILE));
        }
        if let Some(accounts) = &self.accounts {
            parts.push(format!("{} account(s)", accounts.len()));
        }
        if let Some(characters) = &self.characters {
            let count: usize = characters.values().map(BTreeSet::len).sum();
            parts.push(format!("{} character(s)", count));
        }
        parts
    }
}
