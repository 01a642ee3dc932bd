//! Git adapter for the local sync repository.
//!
//! Wraps libgit2 into four operations with explicit outcomes:
//! [`GitAdapter::init_or_clone`], [`GitAdapter::pull`], [`GitAdapter::push`]
//! and [`GitAdapter::resolve_conflict`]. A merge that cannot be completed
//! automatically is reported as [`SyncError::Conflict`] with the merge state
//! left in place for [`GitAdapter::resolve_conflict`].

use crate::error::{Result, SyncError};
use crate::logging::SyncLog;
use crate::services::auth::CredentialResolver;
use camino::{Utf8Path, Utf8PathBuf};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    Commit, ErrorCode, FetchOptions, IndexAddOption, ObjectType, Oid, PushOptions, Repository,
    RepositoryInitOptions, RepositoryState, ResetType,
};
use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::sync::Arc;

pub const REMOTE_NAME: &str = "origin";
pub const DEFAULT_BRANCH: &str = "main";
pub const GITIGNORE_CONTENTS: &str = "# WoW Sync\n*.bak\n*.tmp\n";
pub const COMMIT_MESSAGE: &str = "Update WoW addons and settings";

const DEFAULT_USER_NAME: &str = "WoW Sync";
const DEFAULT_USER_EMAIL: &str = "wowsync@local";
const FETCH_REFSPEC: &str = "refs/heads/*:refs/remotes/origin/*";

/// Result of a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The remote has no branch to pull from yet
    NoRemoteBranch,
    UpToDate,
    FastForwarded,
    /// Fast-forward that had to hard reset over uncommitted local changes
    FastForwardedDiscardingLocal,
    Merged,
}

impl fmt::Display for PullOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PullOutcome::NoRemoteBranch => "Remote has no branch yet",
            PullOutcome::UpToDate => "Already up to date",
            PullOutcome::FastForwarded => "Pull successful",
            PullOutcome::FastForwardedDiscardingLocal => "Pull successful (local changes discarded)",
            PullOutcome::Merged => "Pull successful (merged)",
        };
        f.write_str(text)
    }
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    NothingToPush,
}

/// Which side wins a conflicted pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Discard local commits and changes, adopt the remote branch tip
    UseRemote,
    /// Abort the merge and keep the local commit; the branch stays diverged
    KeepLocal,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictResolution::UseRemote => f.write_str("use remote"),
            ConflictResolution::KeepLocal => f.write_str("keep local"),
        }
    }
}

/// An opened working tree. Not cached between operations.
pub struct RepositoryHandle {
    repo: Repository,
    path: Utf8PathBuf,
}

impl RepositoryHandle {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Name of the branch `HEAD` points at, even before the first commit.
    pub fn current_branch(&self) -> Result<String> {
        current_branch(&self.repo)
    }

    /// True while a merge is waiting for [`GitAdapter::resolve_conflict`].
    pub fn has_pending_conflict(&self) -> Result<bool> {
        Ok(self.repo.state() == RepositoryState::Merge || self.repo.index()?.has_conflicts())
    }
}

impl fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("path", &self.path)
            .finish()
    }
}

/// Git operations against one working tree and one remote.
pub struct GitAdapter {
    repo_path: Utf8PathBuf,
    remote_url: String,
    credentials: Arc<CredentialResolver>,
    log: SyncLog,
}

impl GitAdapter {
    pub fn new(
        repo_path: impl Into<Utf8PathBuf>,
        remote_url: impl Into<String>,
        credentials: Arc<CredentialResolver>,
        log: SyncLog,
    ) -> Self {
        Self {
            repo_path: repo_path.into(),
            remote_url: remote_url.into(),
            credentials,
            log,
        }
    }

    pub fn repo_path(&self) -> &Utf8Path {
        &self.repo_path
    }

    /// Open the working tree, cloning or creating it when needed.
    pub fn init_or_clone(&self) -> Result<RepositoryHandle> {
        if self.repo_path.exists() {
            match Repository::open(&self.repo_path) {
                Ok(repo) => {
                    self.ensure_config(&repo)?;
                    self.ensure_origin(&repo)?;
                    self.log.log("Existing repository loaded");
                    return Ok(self.handle(repo));
                }
                Err(e) => {
                    tracing::debug!("Cannot open {}: {}", self.repo_path, e);
                    self.log
                        .log("Directory exists but is not a git repository, removing...");
                    fs::remove_dir_all(&self.repo_path)
                        .map_err(|e| SyncError::fs(&self.repo_path, e))?;
                }
            }
        }

        self.clone_or_init()
    }

    fn clone_or_init(&self) -> Result<RepositoryHandle> {
        if let Some(parent) = self.repo_path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::fs(parent, e))?;
        }

        self.log
            .log(format!("Cloning repository from {}...", self.remote_url));

        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(self.credentials.callbacks());
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch);

        match builder.clone(&self.remote_url, self.repo_path.as_std_path()) {
            Ok(repo) => {
                self.ensure_config(&repo)?;
                if repo.head().is_err() {
                    self.log
                        .log("Remote repository is empty, creating initial commit...");
                    repo.set_head(&format!("refs/heads/{}", DEFAULT_BRANCH))?;
                    self.seed(&repo)?;
                }
                self.log.log("Repository cloned successfully");
                Ok(self.handle(repo))
            }
            Err(e) if e.code() == ErrorCode::Auth => Err(SyncError::Remote(e)),
            Err(e) => {
                tracing::debug!("Clone of {} failed: {}", self.remote_url, e);
                self.log
                    .log("Remote repository not found, creating new local repository...");
                if self.repo_path.exists() {
                    fs::remove_dir_all(&self.repo_path)
                        .map_err(|e| SyncError::fs(&self.repo_path, e))?;
                }
                self.init_new()
            }
        }
    }

    fn init_new(&self) -> Result<RepositoryHandle> {
        fs::create_dir_all(&self.repo_path).map_err(|e| SyncError::fs(&self.repo_path, e))?;

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(DEFAULT_BRANCH);
        let repo = Repository::init_opts(&self.repo_path, &opts)?;

        self.ensure_config(&repo)?;
        self.seed(&repo)?;
        self.ensure_origin(&repo)?;

        self.log.log("New repository created");
        Ok(self.handle(repo))
    }

    /// Write the ignore file and make the first commit.
    fn seed(&self, repo: &Repository) -> Result<()> {
        let gitignore = self.repo_path.join(".gitignore");
        fs::write(&gitignore, GITIGNORE_CONTENTS).map_err(|e| SyncError::fs(&gitignore, e))?;

        let mut index = repo.index()?;
        index.add_path(std::path::Path::new(".gitignore"))?;
        index.write()?;

        let tree = repo.find_tree(index.write_tree()?)?;
        let sig = repo.signature()?;
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])?;
        Ok(())
    }

    fn ensure_config(&self, repo: &Repository) -> Result<()> {
        let mut config = repo.config()?;

        if config.get_string("user.name").is_err() {
            config.set_str("user.name", DEFAULT_USER_NAME)?;
            self.log
                .log(format!("Set git user.name to '{}'", DEFAULT_USER_NAME));
        }
        if config.get_string("user.email").is_err() {
            config.set_str("user.email", DEFAULT_USER_EMAIL)?;
            self.log
                .log(format!("Set git user.email to '{}'", DEFAULT_USER_EMAIL));
        }
        if config.get_bool("core.filemode").unwrap_or(true) {
            config.set_bool("core.filemode", false)?;
            self.log.log("Disabled file mode tracking");
        }
        Ok(())
    }

    fn ensure_origin(&self, repo: &Repository) -> Result<()> {
        match repo.find_remote(REMOTE_NAME) {
            Ok(remote) => {
                if remote.url() != Some(self.remote_url.as_str()) {
                    repo.remote_set_url(REMOTE_NAME, &self.remote_url)?;
                    self.log.log("Remote 'origin' URL updated");
                }
            }
            Err(_) => {
                repo.remote(REMOTE_NAME, &self.remote_url)?;
                self.log.log("Remote 'origin' added");
            }
        }
        Ok(())
    }

    fn handle(&self, repo: Repository) -> RepositoryHandle {
        RepositoryHandle {
            repo,
            path: self.repo_path.clone(),
        }
    }

    /// Fetch and integrate the remote branch.
    pub fn pull(&self, handle: &RepositoryHandle) -> Result<PullOutcome> {
        let repo = &handle.repo;
        self.fetch(repo)?;

        let Some(target) = remote_branch_target(repo)? else {
            self.log.log("Remote has no branch yet, nothing to pull");
            return Ok(PullOutcome::NoRemoteBranch);
        };

        let annotated = repo.find_annotated_commit(target)?;
        let (analysis, _) = repo.merge_analysis(&[&annotated])?;

        let outcome = if analysis.is_up_to_date() {
            PullOutcome::UpToDate
        } else if analysis.is_fast_forward() || analysis.is_unborn() {
            self.fast_forward(repo, target)?
        } else if analysis.is_normal() {
            self.merge(repo, target)?
        } else {
            return Err(SyncError::Git(git2::Error::from_str(
                "remote branch cannot be merged",
            )));
        };

        if outcome == PullOutcome::FastForwardedDiscardingLocal {
            tracing::warn!(
                "Uncommitted changes in {} were discarded by a fast-forward pull",
                handle.path
            );
        }
        self.log.log(outcome.to_string());
        Ok(outcome)
    }

    fn fetch(&self, repo: &Repository) -> Result<()> {
        self.log.log("Fetching from remote repository...");
        let mut remote = repo.find_remote(REMOTE_NAME)?;
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(self.credentials.callbacks());
        remote.fetch(&[FETCH_REFSPEC], Some(&mut fetch), None)?;
        Ok(())
    }

    fn fast_forward(&self, repo: &Repository, target: Oid) -> Result<PullOutcome> {
        let commit = repo.find_commit(target)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();

        match repo.checkout_tree(commit.as_object(), Some(&mut checkout)) {
            Ok(()) => {
                let local_ref = format!("refs/heads/{}", current_branch(repo)?);
                repo.reference(&local_ref, target, true, "pull: fast-forward")?;
                repo.set_head(&local_ref)?;
                Ok(PullOutcome::FastForwarded)
            }
            Err(e) if e.code() == ErrorCode::Conflict => {
                self.log
                    .log("Local changes conflict with remote. Using remote version...");
                repo.reset(commit.as_object(), ResetType::Hard, None)?;
                Ok(PullOutcome::FastForwardedDiscardingLocal)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn merge(&self, repo: &Repository, target: Oid) -> Result<PullOutcome> {
        let annotated = repo.find_annotated_commit(target)?;
        repo.merge(&[&annotated], None, None)?;

        let mut index = repo.index()?;
        if index.has_conflicts() {
            self.log.log("Merge conflict detected");
            return Err(SyncError::Conflict);
        }

        let tree = repo.find_tree(index.write_tree()?)?;
        let sig = repo.signature()?;
        let local = repo.head()?.peel_to_commit()?;
        let remote = repo.find_commit(target)?;
        repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            "Merge from remote",
            &tree,
            &[&local, &remote],
        )?;
        repo.cleanup_state()?;
        Ok(PullOutcome::Merged)
    }

    /// Commit every working tree change and push the current branch.
    ///
    /// With `force` the remote branch is overwritten, which is how a local
    /// side kept through [`ConflictResolution::KeepLocal`] gets published.
    pub fn push(&self, handle: &RepositoryHandle, force: bool) -> Result<PushOutcome> {
        let repo = &handle.repo;

        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let head = head_commit(repo)?;
        let head_tree = head.as_ref().map(Commit::tree).transpose()?;
        let diff = repo.diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;

        if diff.deltas().len() == 0 {
            if !has_unpushed_commits(repo)? {
                self.log.log("No changes to commit");
                return Ok(PushOutcome::NothingToPush);
            }
            self.log.log("No new changes, pushing existing local commits");
        } else {
            let tree = repo.find_tree(index.write_tree()?)?;
            let sig = repo.signature()?;
            let parents: Vec<&Commit> = head.iter().collect();
            repo.commit(Some("HEAD"), &sig, &sig, COMMIT_MESSAGE, &tree, &parents)?;
            self.log
                .log(format!("Changes committed ({} file(s))", diff.deltas().len()));
        }

        self.push_branch(repo, force)?;
        self.log.log("Push completed successfully!");
        Ok(PushOutcome::Pushed)
    }

    fn push_branch(&self, repo: &Repository, force: bool) -> Result<()> {
        let branch = current_branch(repo)?;
        let prefix = if force { "+" } else { "" };
        let refspec = format!("{prefix}refs/heads/{branch}:refs/heads/{branch}");

        let rejected: RefCell<Option<String>> = RefCell::new(None);
        let mut callbacks = self.credentials.callbacks();
        callbacks.push_update_reference(|refname, status| {
            if let Some(message) = status {
                *rejected.borrow_mut() = Some(format!("{refname}: {message}"));
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        let mut remote = repo.find_remote(REMOTE_NAME)?;
        self.log.log(format!("Pushing {} to remote...", branch));
        match remote.push(&[refspec.as_str()], Some(&mut options)) {
            Ok(()) => {}
            Err(e) if e.code() == ErrorCode::NotFastForward => {
                return Err(SyncError::PushRejected(e.message().to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        drop(options);

        match rejected.into_inner() {
            Some(reason) => Err(SyncError::PushRejected(reason)),
            None => Ok(()),
        }
    }

    /// Settle a conflicted pull in favour of one side.
    pub fn resolve_conflict(
        &self,
        handle: &RepositoryHandle,
        resolution: ConflictResolution,
    ) -> Result<()> {
        if !handle.has_pending_conflict()? {
            return Err(SyncError::NoConflictInProgress);
        }
        let repo = &handle.repo;

        match resolution {
            ConflictResolution::UseRemote => {
                self.log.log("Resolving conflict: using remote changes...");
                let target = remote_branch_target(repo)?
                    .ok_or_else(|| git2::Error::from_str("remote branch not found"))?;
                let object = repo.find_object(target, Some(ObjectType::Commit))?;
                repo.reset(&object, ResetType::Hard, None)?;
                repo.cleanup_state()?;
                self.log.log("Applied remote changes");
            }
            ConflictResolution::KeepLocal => {
                self.log.log("Resolving conflict: keeping local changes...");
                let object = repo.head()?.peel(ObjectType::Commit)?;
                repo.reset(&object, ResetType::Hard, None)?;
                repo.cleanup_state()?;
                self.log.log("Kept local changes");
            }
        }
        Ok(())
    }
}

fn current_branch(repo: &Repository) -> Result<String> {
    let head = repo.find_reference("HEAD")?;
    let branch = head
        .symbolic_target()
        .and_then(|target| target.strip_prefix("refs/heads/"))
        .unwrap_or(DEFAULT_BRANCH);
    Ok(branch.to_string())
}

/// `None` while the branch has no commits.
fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Tip of the remote tracking branch matching the current branch, then
/// `origin/main`, then `origin/master`.
fn remote_branch_target(repo: &Repository) -> Result<Option<Oid>> {
    let current = current_branch(repo)?;
    let mut candidates = vec![current.as_str(), DEFAULT_BRANCH, "master"];
    candidates.dedup();

    for branch in candidates {
        let name = format!("refs/remotes/{}/{}", REMOTE_NAME, branch);
        if let Ok(reference) = repo.find_reference(&name) {
            if let Some(target) = reference.target() {
                return Ok(Some(target));
            }
        }
    }
    Ok(None)
}

fn has_unpushed_commits(repo: &Repository) -> Result<bool> {
    let Some(local) = head_commit(repo)? else {
        return Ok(false);
    };
    let tracking = format!("refs/remotes/{}/{}", REMOTE_NAME, current_branch(repo)?);
    match repo.find_reference(&tracking) {
        Ok(reference) => match reference.target() {
            Some(remote) if remote == local.id() => Ok(false),
            Some(remote) => Ok(repo.graph_ahead_behind(local.id(), remote)?.0 > 0),
            None => Ok(true),
        },
        Err(_) => Ok(true),
    }
}
