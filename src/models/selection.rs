//! Which accounts and characters the user has opted into syncing.
//!
//! Until the user saves a selection everything is synced. Once a selection
//! is saved it is authoritative forever: a version with no selected
//! characters syncs nothing.

use crate::models::game::{CharacterRef, GameVersion};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Characters selected per `(account, realm)` pair.
pub type RealmCharacters = BTreeMap<(String, String), BTreeSet<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Selection {
    /// No selection ever saved; every discovered character is included
    #[default]
    AllIncluded,
    /// A user-confirmed selection
    Explicit(ExplicitSelection),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredSelection")]
pub struct ExplicitSelection {
    /// Selected character keys per version. Authoritative.
    characters: BTreeMap<GameVersion, BTreeSet<String>>,

    /// Accounts with at least one selected character. Rebuilt from
    /// `characters` whenever they change, including on load.
    accounts: BTreeMap<GameVersion, BTreeSet<String>>,
}

/// On-disk shape. A stored `accounts` map is ignored.
#[derive(Deserialize)]
struct StoredSelection {
    #[serde(default)]
    characters: BTreeMap<GameVersion, BTreeSet<String>>,
}

impl From<StoredSelection> for ExplicitSelection {
    fn from(stored: StoredSelection) -> Self {
        let accounts = derive_accounts(&stored.characters);
        Self {
            characters: stored.characters,
            accounts,
        }
    }
}

fn derive_accounts(
    characters: &BTreeMap<GameVersion, BTreeSet<String>>,
) -> BTreeMap<GameVersion, BTreeSet<String>> {
    let mut accounts: BTreeMap<GameVersion, BTreeSet<String>> = BTreeMap::new();
    for (&version, keys) in characters {
        // An empty set still marks the version as explicitly selected
        let entry = accounts.entry(version).or_default();
        for key in keys {
            if let Some(c) = CharacterRef::parse_key(key).filter(|c| c.version == version) {
                entry.insert(c.account);
            }
        }
    }
    accounts
}

impl ExplicitSelection {
    fn from_characters<I>(characters: I) -> Self
    where
        I: IntoIterator<Item = CharacterRef>,
    {
        let mut keys: BTreeMap<GameVersion, BTreeSet<String>> = BTreeMap::new();
        for c in characters {
            keys.entry(c.version).or_default().insert(c.key());
        }
        StoredSelection { characters: keys }.into()
    }
}

impl Selection {
    pub fn has_explicit_selection(&self) -> bool {
        matches!(self, Selection::Explicit(_))
    }

    /// Whether the character identified by `character_key` takes part in sync.
    ///
    /// Only the character set decides; the account is implied by the key.
    pub fn is_included(&self, version: GameVersion, _account: &str, character_key: &str) -> bool {
        match self {
            Selection::AllIncluded => true,
            Selection::Explicit(sel) => sel
                .characters
                .get(&version)
                .is_some_and(|keys| keys.contains(character_key)),
        }
    }

    pub fn is_character_included(&self, character: &CharacterRef) -> bool {
        self.is_included(character.version, &character.account, &character.key())
    }

    pub fn is_account_selected(&self, version: GameVersion, account: &str) -> bool {
        match self {
            Selection::AllIncluded => true,
            Selection::Explicit(sel) => sel
                .accounts
                .get(&version)
                .is_some_and(|accounts| accounts.contains(account)),
        }
    }

    /// Replace the whole selection. The result is always explicit.
    pub fn replace<I>(&mut self, characters: I)
    where
        I: IntoIterator<Item = CharacterRef>,
    {
        *self = Selection::Explicit(ExplicitSelection::from_characters(characters));
    }

    /// Number of selected characters for a version, `None` when implicit.
    pub fn character_count(&self, version: GameVersion) -> Option<usize> {
        match self {
            Selection::AllIncluded => None,
            Selection::Explicit(sel) => {
                Some(sel.characters.get(&version).map_or(0, BTreeSet::len))
            }
        }
    }

    pub fn account_count(&self, version: GameVersion) -> Option<usize> {
        match self {
            Selection::AllIncluded => None,
            Selection::Explicit(sel) => Some(sel.accounts.get(&version).map_or(0, BTreeSet::len)),
        }
    }

    /// Account allow-list for the copy filter, `None` when every account is allowed.
    pub fn account_allow_list(&self, version: GameVersion) -> Option<BTreeSet<String>> {
        match self {
            Selection::AllIncluded => None,
            Selection::Explicit(sel) => Some(sel.accounts.get(&version).cloned().unwrap_or_default()),
        }
    }

    /// Character allow-list grouped by `(account, realm)`, `None` when implicit.
    pub fn character_allow_list(&self, version: GameVersion) -> Option<RealmCharacters> {
        let Selection::Explicit(sel) = self else {
            return None;
        };

        let mut grouped = RealmCharacters::new();
        for key in sel.characters.get(&version).into_iter().flatten() {
            match CharacterRef::parse_key(key) {
                Some(c) if c.version == version => {
                    grouped
                        .entry((c.account, c.realm))
                        .or_default()
                        .insert(c.character);
                }
                _ => tracing::warn!("Ignoring malformed character key in selection: {}", key),
            }
        }
        Some(grouped)
    }
}
