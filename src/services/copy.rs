//! Differential copy engine.
//!
//! Makes a destination tree match a filtered view of a source tree. Two code
//! paths produce the same result: [`fresh_copy`] for a destination that does
//! not exist yet and [`differential_copy`] which only touches entries whose
//! content differs. [`sync_tree`] picks between them.

use crate::error::{Result, SyncError};
use crate::services::filter::{DirContext, EntryInfo, TreeFilter};
use camino::Utf8Path;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Read};
use std::ops::AddAssign;

const COMPARE_CHUNK_SIZE: usize = 64 * 1024;

/// What happens to destination entries the filter excludes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludedPolicy {
    /// Delete them. Used when collecting into the repository so that a
    /// deselected character disappears from the remote.
    Prune,
    /// Leave them alone. Used when applying the repository to the game so
    /// that filtered-out local data survives a pull.
    Preserve,
}

/// Counters for one copy pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files_copied: usize,
    pub files_updated: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub dirs_created: usize,
    pub dirs_removed: usize,
}

impl CopyStats {
    /// Number of filesystem mutations performed.
    pub fn writes(&self) -> usize {
        self.files_copied
            + self.files_updated
            + self.files_deleted
            + self.dirs_created
            + self.dirs_removed
    }
}

impl AddAssign for CopyStats {
    fn add_assign(&mut self, other: Self) {
        self.files_copied += other.files_copied;
        self.files_updated += other.files_updated;
        self.files_unchanged += other.files_unchanged;
        self.files_deleted += other.files_deleted;
        self.dirs_created += other.dirs_created;
        self.dirs_removed += other.dirs_removed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

/// One step of a per-directory plan.
#[derive(Debug)]
enum Action {
    Remove { name: String, kind: EntryKind },
    CopyFile { name: String },
    UpdateFile { name: String },
    CopyDir { name: String },
    Descend { name: String },
}

/// Copy `src` into `dst`, replacing whatever is at `dst`.
pub fn sync_tree(
    src: &Utf8Path,
    dst: &Utf8Path,
    filter: &TreeFilter,
    policy: ExcludedPolicy,
) -> Result<CopyStats> {
    if dst.is_dir() {
        return differential_copy(src, dst, filter, policy);
    }

    let mut stats = CopyStats::default();
    if dst.exists() {
        fs::remove_file(dst).map_err(|e| SyncError::fs(dst, e))?;
        stats.files_deleted += 1;
    }
    stats += fresh_copy(src, dst, filter)?;
    Ok(stats)
}

/// Recursively copy the filtered `src` tree to a new `dst`.
pub fn fresh_copy(src: &Utf8Path, dst: &Utf8Path, filter: &TreeFilter) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    copy_dir_fresh(src, dst, filter, &filter.root_context(), &mut stats)?;
    tracing::debug!("Fresh copy {} -> {}: {:?}", src, dst, stats);
    Ok(stats)
}

/// Bring an existing `dst` in line with the filtered `src` tree.
pub fn differential_copy(
    src: &Utf8Path,
    dst: &Utf8Path,
    filter: &TreeFilter,
    policy: ExcludedPolicy,
) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    sync_dir(src, dst, filter, policy, &filter.root_context(), &mut stats)?;
    tracing::debug!("Differential copy {} -> {}: {:?}", src, dst, stats);
    Ok(stats)
}

fn copy_dir_fresh(
    src: &Utf8Path,
    dst: &Utf8Path,
    filter: &TreeFilter,
    ctx: &DirContext,
    stats: &mut CopyStats,
) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| SyncError::fs(dst, e))?;
    stats.dirs_created += 1;

    let entries = list_dir(src)?;
    let excluded = filter.excluded(ctx, &entry_infos(&entries));

    for (name, kind) in &entries {
        if excluded.contains(name) {
            continue;
        }
        let from = src.join(name);
        let to = dst.join(name);
        match kind {
            EntryKind::File => {
                copy_file(&from, &to)?;
                stats.files_copied += 1;
            }
            EntryKind::Dir => copy_dir_fresh(&from, &to, filter, &ctx.child(name), stats)?,
        }
    }
    Ok(())
}

fn sync_dir(
    src: &Utf8Path,
    dst: &Utf8Path,
    filter: &TreeFilter,
    policy: ExcludedPolicy,
    ctx: &DirContext,
    stats: &mut CopyStats,
) -> Result<()> {
    let plan = plan_dir(src, dst, filter, policy, ctx, stats)?;

    // Deletions first so a type change never collides with the new entry
    for action in &plan {
        if let Action::Remove { name, kind } = action {
            let path = dst.join(name);
            match kind {
                EntryKind::File => {
                    fs::remove_file(&path).map_err(|e| SyncError::fs(&path, e))?;
                    stats.files_deleted += 1;
                }
                EntryKind::Dir => {
                    fs::remove_dir_all(&path).map_err(|e| SyncError::fs(&path, e))?;
                    stats.dirs_removed += 1;
                }
            }
        }
    }

    for action in &plan {
        match action {
            Action::CopyFile { name } => {
                copy_file(&src.join(name), &dst.join(name))?;
                stats.files_copied += 1;
            }
            Action::UpdateFile { name } => {
                copy_file(&src.join(name), &dst.join(name))?;
                stats.files_updated += 1;
            }
            Action::CopyDir { name } => {
                copy_dir_fresh(&src.join(name), &dst.join(name), filter, &ctx.child(name), stats)?
            }
            _ => {}
        }
    }

    for action in &plan {
        if let Action::Descend { name } = action {
            sync_dir(
                &src.join(name),
                &dst.join(name),
                filter,
                policy,
                &ctx.child(name),
                stats,
            )?;
        }
    }
    Ok(())
}

/// Work out everything that has to happen in one directory.
///
/// Unchanged files are counted here since they produce no action.
fn plan_dir(
    src: &Utf8Path,
    dst: &Utf8Path,
    filter: &TreeFilter,
    policy: ExcludedPolicy,
    ctx: &DirContext,
    stats: &mut CopyStats,
) -> Result<Vec<Action>> {
    let src_entries = list_dir(src)?;
    let dst_entries = list_dir(dst)?;

    // Source exclusions decide what gets copied, destination exclusions only
    // decide what the policy may keep.
    let src_excluded: HashSet<String> = filter.excluded(ctx, &entry_infos(&src_entries));
    let dst_excluded: HashSet<String> = filter.excluded(ctx, &entry_infos(&dst_entries));

    let mut plan = Vec::new();

    for (name, &dst_kind) in &dst_entries {
        let wanted = src_entries
            .get(name)
            .filter(|_| !src_excluded.contains(name));
        let remove = match wanted {
            Some(&src_kind) => src_kind != dst_kind,
            None => !dst_excluded.contains(name) || policy == ExcludedPolicy::Prune,
        };
        if remove {
            plan.push(Action::Remove {
                name: name.clone(),
                kind: dst_kind,
            });
        }
    }

    for (name, &src_kind) in &src_entries {
        if src_excluded.contains(name) {
            continue;
        }
        let name = name.clone();
        let action = match (src_kind, dst_entries.get(&name)) {
            (EntryKind::File, Some(EntryKind::File)) => {
                let (from, to) = (src.join(&name), dst.join(&name));
                if files_equal(&from, &to).map_err(|e| SyncError::fs(&from, e))? {
                    stats.files_unchanged += 1;
                    continue;
                }
                Action::UpdateFile { name }
            }
            (EntryKind::Dir, Some(EntryKind::Dir)) => Action::Descend { name },
            // Missing, or removed above because its type changed
            (EntryKind::File, _) => Action::CopyFile { name },
            (EntryKind::Dir, _) => Action::CopyDir { name },
        };
        plan.push(action);
    }

    Ok(plan)
}

/// Files and directories in `dir`, sorted by name.
///
/// Symlinks are followed; dangling links and non UTF-8 names are skipped.
fn list_dir(dir: &Utf8Path) -> Result<BTreeMap<String, EntryKind>> {
    let entries = dir.read_dir_utf8().map_err(|e| SyncError::fs(dir, e))?;

    let mut listing = BTreeMap::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!("Skipping non UTF-8 entry in {}", dir);
                continue;
            }
            Err(e) => return Err(SyncError::fs(dir, e)),
        };

        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| SyncError::fs(path, e))?;
        let is_dir = if file_type.is_symlink() {
            match fs::metadata(path) {
                Ok(meta) => meta.is_dir(),
                Err(_) => {
                    tracing::warn!("Skipping dangling symlink {}", path);
                    continue;
                }
            }
        } else {
            file_type.is_dir()
        };

        let kind = if is_dir {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        listing.insert(entry.file_name().to_string(), kind);
    }
    Ok(listing)
}

fn entry_infos(entries: &BTreeMap<String, EntryKind>) -> Vec<EntryInfo> {
    entries
        .iter()
        .map(|(name, kind)| EntryInfo {
            name: name.clone(),
            is_dir: *kind == EntryKind::Dir,
        })
        .collect()
}

fn copy_file(from: &Utf8Path, to: &Utf8Path) -> Result<()> {
    fs::copy(from, to).map_err(|e| SyncError::fs(to, e))?;
    Ok(())
}

/// Same length and same bytes.
fn files_equal(a: &Utf8Path, b: &Utf8Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }

    let mut fa = File::open(a)?;
    let mut fb = File::open(b)?;
    let mut buf_a = vec![0u8; COMPARE_CHUNK_SIZE];
    let mut buf_b = vec![0u8; COMPARE_CHUNK_SIZE];

    loop {
        let n = read_full(&mut fa, &mut buf_a)?;
        let m = read_full(&mut fb, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` unless the reader hits end of file first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
