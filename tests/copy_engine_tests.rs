//! Integration tests for the differential copy engine
//!
//! These tests verify:
//! - Fresh and differential copies of the same source produce the same tree
//! - A second pass over an unchanged tree writes nothing
//! - Deselected characters and accounts disappear from the repository side
//! - Account-wide SavedVariables and Config.wtf never leave the installation
//!   unless asked for

use camino::{Utf8Path, Utf8PathBuf};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use tempfile::TempDir;
use walkdir::WalkDir;
use wowsync::models::{ContentKind, RealmCharacters, SyncSettings};
use wowsync::services::{
    CopyStats, ExcludedPolicy, TreeFilter, differential_copy, fresh_copy, sync_tree,
};
use wowsync::{CharacterRef, GameVersion, Selection};

/// Directory and file names never overlap so generated trees have no type clashes.
const DIR_NAMES: &[&str] = &[
    "Account",
    "ACC1",
    "ACC2",
    "Silvermoon",
    "Draenor",
    "Hero",
    "Alt",
    "SavedVariables",
    "Misc",
];
const FILE_NAMES: &[&str] = &[
    "Config.wtf",
    "config.wtf",
    "bindings-cache.wtf",
    "Addon.lua",
    "layout-local.txt",
];

type Tree = BTreeMap<String, Option<Vec<u8>>>;

fn temp_root() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn write(root: &Utf8Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn build_tree(root: &Utf8Path, files: &[(Vec<&str>, &str, String)]) {
    fs::create_dir_all(root).unwrap();
    for (dirs, file, contents) in files {
        let mut path = root.to_path_buf();
        for dir in dirs {
            path.push(dir);
        }
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(file), contents).unwrap();
    }
}

/// Every entry under `root` keyed by relative path; directories map to `None`.
fn snapshot(root: &Utf8Path) -> Tree {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            let contents = entry
                .file_type()
                .is_file()
                .then(|| fs::read(entry.path()).unwrap());
            (rel, contents)
        })
        .collect()
}

fn realm_characters(entries: &[(&str, &str, &[&str])]) -> RealmCharacters {
    entries
        .iter()
        .map(|(account, realm, characters)| {
            (
                (account.to_string(), realm.to_string()),
                characters.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect()
}

fn accounts(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn filter_strategy() -> impl Strategy<Value = TreeFilter> {
    prop_oneof![
        Just(TreeFilter::passthrough()),
        Just(TreeFilter::settings(false, None, None)),
        Just(TreeFilter::settings(true, None, None)),
        Just(TreeFilter::settings(
            false,
            Some(accounts(&["ACC1"])),
            Some(realm_characters(&[("ACC1", "Silvermoon", &["Hero"][..])])),
        )),
        Just(TreeFilter::settings(true, Some(BTreeSet::new()), Some(RealmCharacters::new()))),
    ]
}

fn files_strategy() -> impl Strategy<Value = Vec<(Vec<&'static str>, &'static str, String)>> {
    prop::collection::vec(
        (
            prop::collection::vec(prop::sample::select(DIR_NAMES), 0..5),
            prop::sample::select(FILE_NAMES),
            "[a-z]{0,12}",
        ),
        0..16,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_differential_matches_fresh_copy(
        src_files in files_strategy(),
        stale_files in files_strategy(),
        filter in filter_strategy(),
    ) {
        let (_temp, root) = temp_root();
        let src = root.join("src");
        let fresh = root.join("fresh");
        let synced = root.join("synced");
        build_tree(&src, &src_files);
        build_tree(&synced, &stale_files);

        fresh_copy(&src, &fresh, &filter).unwrap();
        differential_copy(&src, &synced, &filter, ExcludedPolicy::Prune).unwrap();

        prop_assert_eq!(snapshot(&fresh), snapshot(&synced));
    }

    #[test]
    fn prop_second_pass_writes_nothing(
        src_files in files_strategy(),
        stale_files in files_strategy(),
        filter in filter_strategy(),
        prune in any::<bool>(),
    ) {
        let (_temp, root) = temp_root();
        let src = root.join("src");
        let dst = root.join("dst");
        build_tree(&src, &src_files);
        build_tree(&dst, &stale_files);
        let policy = if prune { ExcludedPolicy::Prune } else { ExcludedPolicy::Preserve };

        sync_tree(&src, &dst, &filter, policy).unwrap();
        let before = snapshot(&dst);
        let stats = sync_tree(&src, &dst, &filter, policy).unwrap();

        prop_assert_eq!(stats.writes(), 0);
        prop_assert_eq!(snapshot(&dst), before);
    }
}

fn settings_for(selection: Selection, sync_settings_file: bool) -> SyncSettings {
    SyncSettings {
        enabled_versions: vec![GameVersion::Retail],
        sync_settings_file,
        selection,
    }
}

fn populate_settings_tree(wtf: &Utf8Path) {
    write(wtf, "Config.wtf", "SET gxWindow 1");
    write(wtf, "SavedVariables/Blizzard.lua", "global");
    for (account, realm, character) in [
        ("ACC1", "Silvermoon", "Hero"),
        ("ACC1", "Silvermoon", "Alt"),
        ("ACC1", "Draenor", "Tank"),
        ("ACC2", "Silvermoon", "Healer"),
    ] {
        write(
            wtf,
            &format!("Account/{account}/{realm}/{character}/AddOns.txt"),
            character,
        );
    }
    write(wtf, "Account/ACC1/SavedVariables/Details.lua", "account wide");
}

#[test]
fn test_deselected_characters_disappear_from_repository() {
    let (_temp, root) = temp_root();
    let wtf = root.join("WTF");
    let repo = root.join("repo");
    populate_settings_tree(&wtf);

    // First push with the implicit "everything" selection
    let everything = settings_for(Selection::AllIncluded, false);
    let filter = TreeFilter::for_sync(ContentKind::Settings, GameVersion::Retail, &everything);
    sync_tree(&wtf, &repo, &filter, ExcludedPolicy::Prune).unwrap();
    assert!(repo.join("Account/ACC1/Silvermoon/Alt/AddOns.txt").exists());
    assert!(repo.join("Account/ACC2/Silvermoon/Healer/AddOns.txt").exists());

    // Narrow down to a single character
    let mut selection = Selection::AllIncluded;
    selection.replace([CharacterRef::new(
        GameVersion::Retail,
        "ACC1",
        "Silvermoon",
        "Hero",
    )]);
    let narrowed = settings_for(selection, false);
    let filter = TreeFilter::for_sync(ContentKind::Settings, GameVersion::Retail, &narrowed);
    let stats = sync_tree(&wtf, &repo, &filter, ExcludedPolicy::Prune).unwrap();

    assert!(repo.join("Account/ACC1/Silvermoon/Hero/AddOns.txt").exists());
    assert!(!repo.join("Account/ACC1/Silvermoon/Alt").exists());
    assert!(!repo.join("Account/ACC2").exists());
    // A realm without selected characters keeps all of them
    assert!(repo.join("Account/ACC1/Draenor/Tank/AddOns.txt").exists());
    // Account-wide data of a selected account still syncs
    assert!(repo.join("Account/ACC1/SavedVariables/Details.lua").exists());
    assert_eq!(stats.dirs_removed, 2);
    assert_eq!(stats.files_copied, 0);

    // Local game data is untouched
    assert!(wtf.join("Account/ACC2/Silvermoon/Healer/AddOns.txt").exists());
}

#[test]
fn test_global_saved_variables_and_config_file_stay_local() {
    let (_temp, root) = temp_root();
    let wtf = root.join("WTF");
    let repo = root.join("repo");
    populate_settings_tree(&wtf);

    let filter = TreeFilter::for_sync(
        ContentKind::Settings,
        GameVersion::Retail,
        &settings_for(Selection::AllIncluded, false),
    );
    fresh_copy(&wtf, &repo, &filter).unwrap();
    assert!(!repo.join("SavedVariables").exists());
    assert!(!repo.join("Config.wtf").exists());

    // Opting into the settings file only adds Config.wtf
    let filter = TreeFilter::for_sync(
        ContentKind::Settings,
        GameVersion::Retail,
        &settings_for(Selection::AllIncluded, true),
    );
    let stats = sync_tree(&wtf, &repo, &filter, ExcludedPolicy::Prune).unwrap();
    assert_eq!(
        stats,
        CopyStats {
            files_copied: 1,
            files_unchanged: 5,
            ..Default::default()
        }
    );
    assert!(repo.join("Config.wtf").exists());
    assert!(!repo.join("SavedVariables").exists());
}

#[test]
fn test_empty_selection_syncs_no_accounts() {
    let (_temp, root) = temp_root();
    let wtf = root.join("WTF");
    let repo = root.join("repo");
    populate_settings_tree(&wtf);

    let mut selection = Selection::AllIncluded;
    selection.replace(Vec::<CharacterRef>::new());
    let filter = TreeFilter::for_sync(
        ContentKind::Settings,
        GameVersion::Retail,
        &settings_for(selection, false),
    );
    fresh_copy(&wtf, &repo, &filter).unwrap();

    assert!(repo.join("Account").is_dir());
    assert_eq!(fs::read_dir(repo.join("Account")).unwrap().count(), 0);
}

#[test]
fn test_addons_are_copied_unfiltered() {
    let (_temp, root) = temp_root();
    let addons = root.join("AddOns");
    let repo = root.join("repo");
    write(&addons, "SavedVariables/odd-but-kept.lua", "x");
    write(&addons, "WeakAuras/Config.wtf", "x");
    write(&addons, "WeakAuras/WeakAuras.toc", "## Interface: 110000");

    let mut selection = Selection::AllIncluded;
    selection.replace(Vec::<CharacterRef>::new());
    let filter = TreeFilter::for_sync(
        ContentKind::Addons,
        GameVersion::Retail,
        &settings_for(selection, false),
    );
    sync_tree(&addons, &repo, &filter, ExcludedPolicy::Prune).unwrap();

    assert_eq!(snapshot(&addons), snapshot(&repo));
}

#[test]
fn test_apply_keeps_local_only_excluded_data() {
    let (_temp, root) = temp_root();
    let repo = root.join("repo");
    let wtf = root.join("WTF");
    write(&repo, "Account/ACC1/Silvermoon/Hero/AddOns.txt", "from remote");
    populate_settings_tree(&wtf);

    let mut selection = Selection::AllIncluded;
    selection.replace([CharacterRef::new(
        GameVersion::Retail,
        "ACC1",
        "Silvermoon",
        "Hero",
    )]);
    let filter = TreeFilter::for_sync(
        ContentKind::Settings,
        GameVersion::Retail,
        &settings_for(selection, false),
    );
    let stats = sync_tree(&repo, &wtf, &filter, ExcludedPolicy::Preserve).unwrap();

    assert_eq!(stats.files_updated, 1);
    assert_eq!(
        fs::read_to_string(wtf.join("Account/ACC1/Silvermoon/Hero/AddOns.txt")).unwrap(),
        "from remote"
    );
    // Filtered entries survive, selected-but-absent ones do not
    assert!(wtf.join("Config.wtf").exists());
    assert!(wtf.join("SavedVariables/Blizzard.lua").exists());
    assert!(wtf.join("Account/ACC2/Silvermoon/Healer").exists());
    assert!(wtf.join("Account/ACC1/Silvermoon/Alt").exists());
    assert!(!wtf.join("Account/ACC1/Draenor").exists());
}

#[test]
fn test_differential_matches_fresh_when_names_change_kind() {
    let (_temp, root) = temp_root();
    let src = root.join("src");
    write(&src, "Account/ACC1/Silvermoon/Hero/layout-local.txt", "hero");
    write(&src, "Account/ACC2", "file where an account used to be");
    write(&src, "Account/ACC1/Silvermoon/Alt", "file where a character used to be");

    let dst = root.join("dst");
    write(&dst, "Account/ACC2/Silvermoon/Healer/layout-local.txt", "old");
    write(&dst, "Account/ACC1/Silvermoon/Alt/layout-local.txt", "old");

    let filter = TreeFilter::settings(
        true,
        Some(accounts(&["ACC1"])),
        Some(realm_characters(&[("ACC1", "Silvermoon", &["Hero"][..])])),
    );
    differential_copy(&src, &dst, &filter, ExcludedPolicy::Prune).unwrap();
    fresh_copy(&src, &root.join("fresh"), &filter).unwrap();

    assert_eq!(snapshot(&dst), snapshot(&root.join("fresh")));
    assert!(dst.join("Account/ACC2").is_file());
    assert!(dst.join("Account/ACC1/Silvermoon/Alt").is_file());
}
